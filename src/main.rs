#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() {
    use axum::Router;
    use class_scoreboard::app::*;
    use class_scoreboard::{build_pool, DatabaseConfig};
    use leptos::logging::log;
    use leptos::prelude::*;
    use leptos_axum::{generate_route_list, LeptosRoutes};

    let db_config = DatabaseConfig::from_env().expect("Invalid database configuration.");
    let pool = build_pool(&db_config).expect("Failed to create pool.");

    let conf = get_configuration(None).unwrap();
    let addr = conf.leptos_options.site_addr;
    let leptos_options = conf.leptos_options;
    // Generate the list of routes in your Leptos App
    let routes = generate_route_list(App);

    let leptos_options_clone = leptos_options.clone();
    let app = Router::new()
        .leptos_routes_with_context(
            &leptos_options,
            routes,
            // Provide pool for server functions.
            move || provide_context(pool.clone()),
            // Use App for main routes.
            move || shell(leptos_options_clone.clone()),
        )
        // Use shell for fallback.
        .fallback(leptos_axum::file_and_error_handler(shell))
        .with_state(leptos_options.clone());

    log!(
        "serving scoreboards from {} (pool size {})",
        db_config.database_url,
        db_config.pool_size
    );
    log!("listening on http://{}", &addr);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // no client-side main function
    // see lib.rs for hydration function instead
}
