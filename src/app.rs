use leptos::prelude::*;
use leptos::server_fn::error::NoCustomError;
use leptos::task::spawn_local;
use leptos_meta::{provide_meta_context, MetaTags, Stylesheet, Title};
use leptos_router::{
    components::{Route, Router, Routes},
    hooks::use_params_map,
    path,
};

use crate::model::{Activity, ActivityScore, PointRecord, RankedScore, Student, StudentPoints};
use crate::scoreboard::{
    ranked_rows, ActivityScoresQuery, ActivitySelection, FetchFailure, FetchGeneration, LoadState,
    RankingQuery, ScoreSource, ACTIVITIES_LOAD_ERROR, SCOREBOARD_LOAD_ERROR,
};
#[cfg(feature = "ssr")]
use crate::{
    get_activity_points_with_students, get_class_activities, get_class_roster,
    get_student_activity_points,
};

#[cfg(feature = "ssr")]
use diesel::r2d2::{ConnectionManager, Pool};
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

// Runs a blocking diesel query on a pooled connection.
#[cfg(feature = "ssr")]
async fn run_query<T, F>(query: F) -> Result<T, ServerFnError<NoCustomError>>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, diesel::result::Error> + Send + 'static,
{
    let pool: DbPool = expect_context();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?;
        query(&mut *conn).map_err(|e| ServerFnError::ServerError(e.to_string()))
    })
    .await
    .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?
}

#[server(ListClassActivities)]
pub async fn list_class_activities(
    class_id: String,
) -> Result<Vec<Activity>, ServerFnError<NoCustomError>> {
    run_query(move |conn| get_class_activities(conn, &class_id)).await
}

#[server(ListStudentPoints)]
pub async fn list_student_points(
    student_id: String,
    activity_ids: Vec<String>,
) -> Result<Vec<PointRecord>, ServerFnError<NoCustomError>> {
    run_query(move |conn| get_student_activity_points(conn, &student_id, &activity_ids)).await
}

#[server(ListActivityPoints)]
pub async fn list_activity_points(
    activity_id: String,
) -> Result<Vec<StudentPoints>, ServerFnError<NoCustomError>> {
    run_query(move |conn| get_activity_points_with_students(conn, &activity_id)).await
}

#[server(ListClassRoster)]
pub async fn list_class_roster(
    class_id: String,
) -> Result<Vec<Student>, ServerFnError<NoCustomError>> {
    run_query(move |conn| get_class_roster(conn, &class_id)).await
}

/// Reads scoreboard data through the server functions above.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerSource;

impl ScoreSource for ServerSource {
    async fn class_activities(&self, class_id: &str) -> Result<Vec<Activity>, FetchFailure> {
        Ok(list_class_activities(class_id.to_string()).await?)
    }

    async fn student_points(
        &self,
        student_id: &str,
        activity_ids: &[String],
    ) -> Result<Vec<PointRecord>, FetchFailure> {
        Ok(list_student_points(student_id.to_string(), activity_ids.to_vec()).await?)
    }

    async fn activity_points(
        &self,
        activity_id: &str,
    ) -> Result<Vec<StudentPoints>, FetchFailure> {
        Ok(list_activity_points(activity_id.to_string()).await?)
    }

    async fn class_roster(&self, class_id: &str) -> Result<Vec<Student>, FetchFailure> {
        Ok(list_class_roster(class_id.to_string()).await?)
    }
}

pub fn shell(options: LeptosOptions) -> impl IntoView {
    view! {
        <!DOCTYPE html>
        <html lang="en">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <AutoReload options=options.clone() />
                <HydrationScripts options />
                <MetaTags />
            </head>
            <body>
                <App />
            </body>
        </html>
    }
}

#[component]
pub fn App() -> impl IntoView {
    // Provides context that manages stylesheets, titles, meta tags, etc.
    provide_meta_context();

    view! {
        <Stylesheet id="leptos" href="/pkg/class-scoreboard.css" />

        <Title text="Class Scoreboard" />

        <Router>
            <main>
                <Routes fallback=|| "Page not found.".into_view()>
                    <Route
                        path=path!("/classes/:class_id/students/:student_id")
                        view=StudentScoreboardPage
                    />
                </Routes>
            </main>
        </Router>
    }
}

#[component]
fn StudentScoreboardPage() -> impl IntoView {
    let params = use_params_map();
    let class_id = Signal::derive(move || params.with(|p| p.get("class_id").unwrap_or_default()));
    let student_id =
        Signal::derive(move || params.with(|p| p.get("student_id").unwrap_or_default()));

    view! { <ActivityScoreboard class_id student_id /> }
}

#[component]
pub fn LoadingSpinner() -> impl IntoView {
    view! { <div class="spinner" role="status" aria-label="Loading"></div> }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonVariant {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonSize {
    Small,
    #[default]
    Medium,
}

#[component]
pub fn Button(
    #[prop(optional)] variant: ButtonVariant,
    #[prop(optional)] size: ButtonSize,
    on_click: Callback<()>,
    children: Children,
) -> impl IntoView {
    let variant_class = match variant {
        ButtonVariant::Primary => "btn-primary",
        ButtonVariant::Secondary => "btn-secondary",
    };
    let size_class = match size {
        ButtonSize::Small => "btn-sm",
        ButtonSize::Medium => "btn-md",
    };

    view! {
        <button
            type="button"
            class=format!("btn {} {}", variant_class, size_class)
            on:click=move |_| on_click.run(())
        >
            {children()}
        </button>
    }
}

/// Dialog shell. Renders its children only while `is_open` holds; the backdrop and the close
/// button both invoke `on_close`.
#[component]
pub fn Modal(
    #[prop(into)] is_open: Signal<bool>,
    on_close: Callback<()>,
    #[prop(into)] title: String,
    children: ChildrenFn,
) -> impl IntoView {
    move || {
        is_open.get().then(|| {
            view! {
                <div class="modal-backdrop" on:click=move |_| on_close.run(())>
                    <div class="modal" role="dialog" on:click=|ev| ev.stop_propagation()>
                        <header class="modal-header">
                            <h2>{title.clone()}</h2>
                            <button
                                type="button"
                                class="modal-close"
                                aria-label="Close"
                                on:click=move |_| on_close.run(())
                            >
                                "×"
                            </button>
                        </header>
                        <div class="modal-body">{children()}</div>
                    </div>
                </div>
            }
        })
    }
}

/// A student's points on every activity of their class, with a leaderboard per activity.
#[component]
pub fn ActivityScoreboard(
    #[prop(into)] class_id: Signal<String>,
    #[prop(into)] student_id: Signal<String>,
) -> impl IntoView {
    let state = RwSignal::new(LoadState::<Vec<ActivityScore>>::Loading);
    let selection = RwSignal::new(ActivitySelection::default());
    let generation = StoredValue::new(FetchGeneration::default());

    Effect::new(move || {
        let query = ActivityScoresQuery::new(class_id.get(), student_id.get());
        let Some(ticket) = generation.try_update_value(FetchGeneration::begin) else {
            return;
        };
        state.set(LoadState::Loading);
        selection.update(ActivitySelection::clear);

        spawn_local(async move {
            let result = query.load(&ServerSource).await;
            if generation
                .try_with_value(|g| g.is_current(ticket))
                .unwrap_or(false)
            {
                state.try_set(LoadState::from_result(result, ACTIVITIES_LOAD_ERROR));
            }
        });
    });

    let close_rankings = Callback::new(move |_: ()| selection.update(ActivitySelection::clear));
    let rankings_open = Signal::derive(move || selection.with(ActivitySelection::is_open));

    view! {
        <div class="card">
            {move || match state.get() {
                LoadState::Loading => {
                    view! {
                        <div class="centered">
                            <LoadingSpinner />
                        </div>
                    }
                        .into_any()
                }
                LoadState::Failed(message) => {
                    view! { <p class="error centered">{message}</p> }.into_any()
                }
                LoadState::Ready(scores) if scores.is_empty() => {
                    view! { <div class="empty centered">"No activities available yet"</div> }
                        .into_any()
                }
                LoadState::Ready(scores) => {
                    view! {
                        <div class="card-title">
                            <span class="trophy">"🏆"</span>
                            <h2>"On-going Class Activities Scoreboard"</h2>
                        </div>
                        <div class="table-scroll">
                            <table class="scoreboard">
                                <thead>
                                    <tr>
                                        <th class="left">"Current Activities"</th>
                                        <th class="right">"Your Score"</th>
                                        <th class="right">"Actions"</th>
                                    </tr>
                                </thead>
                                <tbody>
                                    {scores
                                        .into_iter()
                                        .map(|score| {
                                            let ActivityScore { activity, points } = score;
                                            let name = activity.name.clone();
                                            let open_rankings = Callback::new(move |_: ()| {
                                                let activity = activity.clone();
                                                selection.update(|s| s.select(activity));
                                            });
                                            view! {
                                                <tr>
                                                    <td class="activity-name">{name}</td>
                                                    <td class="right points">{points}</td>
                                                    <td class="right">
                                                        <Button
                                                            size=ButtonSize::Small
                                                            variant=ButtonVariant::Secondary
                                                            on_click=open_rankings
                                                        >
                                                            <span class="chart">"📊"</span>
                                                            <span>"View Rankings"</span>
                                                        </Button>
                                                    </td>
                                                </tr>
                                            }
                                        })
                                        .collect_view()}
                                </tbody>
                            </table>
                        </div>
                    }
                        .into_any()
                }
            }}
            {move || {
                selection
                    .with(|s| s.selected().cloned())
                    .map(|activity| {
                        view! {
                            <ActivityRankingModal
                                activity
                                is_open=rankings_open
                                on_close=close_rankings
                            />
                        }
                    })
            }}
        </div>
    }
}

/// Leaderboard of every student in the activity's class, zero-point students included.
#[component]
pub fn ActivityRankingModal(
    activity: Activity,
    #[prop(into)] is_open: Signal<bool>,
    on_close: Callback<()>,
) -> impl IntoView {
    let state = RwSignal::new(LoadState::<Vec<RankedScore>>::Loading);
    let generation = StoredValue::new(FetchGeneration::default());
    let title = format!("Class Scoreboard - {}", activity.name);

    Effect::new(move || {
        let Some(query) = RankingQuery::when_open(is_open.get(), &activity) else {
            generation.try_update_value(FetchGeneration::invalidate);
            return;
        };
        let Some(ticket) = generation.try_update_value(FetchGeneration::begin) else {
            return;
        };
        state.set(LoadState::Loading);

        spawn_local(async move {
            let result = query.load(&ServerSource).await;
            if generation
                .try_with_value(|g| g.is_current(ticket))
                .unwrap_or(false)
            {
                state.try_set(LoadState::from_result(result, SCOREBOARD_LOAD_ERROR));
            }
        });
    });

    view! {
        <Modal is_open on_close title>
            {move || match state.get() {
                LoadState::Loading => {
                    view! {
                        <div class="centered padded">
                            <LoadingSpinner />
                        </div>
                    }
                        .into_any()
                }
                LoadState::Failed(message) => {
                    view! { <div class="error centered">{message}</div> }.into_any()
                }
                LoadState::Ready(scores) => {
                    view! {
                        <div class="ranking-scroll">
                            <table class="scoreboard">
                                <thead class="sticky">
                                    <tr>
                                        <th class="left">"Rank"</th>
                                        <th class="left">"Student"</th>
                                        <th class="right">"Points"</th>
                                    </tr>
                                </thead>
                                <tbody>
                                    {ranked_rows(&scores)
                                        .into_iter()
                                        .map(|row| {
                                            let row_class = if row.is_leader { "leader" } else { "" };
                                            let rank_class = if row.is_leader {
                                                "rank-label leader-text"
                                            } else {
                                                "rank-label"
                                            };
                                            view! {
                                                <tr class=row_class>
                                                    <td>
                                                        <div class="rank">
                                                            {row
                                                                .is_leader
                                                                .then(|| {
                                                                    view! { <span class="trophy leader-trophy">"🏆"</span> }
                                                                })}
                                                            <span class=rank_class>{format!("#{}", row.rank)}</span>
                                                        </div>
                                                    </td>
                                                    <td class="student-name">{row.display_name}</td>
                                                    <td class="right points">{row.points}</td>
                                                </tr>
                                            }
                                        })
                                        .collect_view()}
                                </tbody>
                            </table>
                        </div>
                    }
                        .into_any()
                }
            }}
        </Modal>
    }
}
