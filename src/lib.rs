pub mod app;
pub mod model;
#[cfg(feature = "ssr")]
pub mod schema;
pub mod scoreboard;

#[cfg(feature = "ssr")]
use diesel::connection::SimpleConnection;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use dotenvy::dotenv;
#[cfg(feature = "ssr")]
use std::env;

#[cfg(feature = "ssr")]
use crate::app::DbPool;
#[cfg(feature = "ssr")]
use crate::model::{Activity, PointRecord, Student, StudentPoints};
#[cfg(feature = "ssr")]
use crate::schema::{activities, activity_points, students};

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::*;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}

#[cfg(feature = "ssr")]
const DEFAULT_POOL_SIZE: u32 = 8;

#[cfg(feature = "ssr")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in .env")]
    Missing(&'static str),
    #[error("{name} must be a positive integer, got {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Database settings read from the environment.
#[cfg(feature = "ssr")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub pool_size: u32,
}

#[cfg(feature = "ssr")]
impl DatabaseConfig {
    /// Loads `.env` if present, then reads `DATABASE_URL` and the optional `DB_POOL_SIZE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let pool_size = match lookup("DB_POOL_SIZE") {
            None => DEFAULT_POOL_SIZE,
            Some(value) => match value.trim().parse::<u32>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "DB_POOL_SIZE",
                        value,
                    })
                }
            },
        };

        Ok(Self {
            database_url,
            pool_size,
        })
    }
}

/// Applied to every pooled connection. The scoreboards never write, so connections are opened
/// query-only, with a timeout to wait out writers from the rest of the application.
#[cfg(feature = "ssr")]
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyPragmas;

#[cfg(feature = "ssr")]
impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ReadOnlyPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; \
            PRAGMA query_only = ON; \
            PRAGMA busy_timeout = 10000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[cfg(feature = "ssr")]
pub fn build_pool(config: &DatabaseConfig) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<SqliteConnection>::new(&config.database_url);
    Pool::builder()
        .max_size(config.pool_size)
        .connection_customizer(Box::new(ReadOnlyPragmas))
        .build(manager)
}

/// Fetches the activities of a class, newest first.
#[cfg(feature = "ssr")]
pub fn get_class_activities(
    conn: &mut SqliteConnection,
    class_id: &str,
) -> Result<Vec<Activity>, diesel::result::Error> {
    activities::table
        .filter(activities::class_id.eq(class_id))
        .order(activities::created_at.desc())
        .select(Activity::as_select())
        .load(conn)
}

/// Fetches a student's point records for the given activities. No query is issued for an empty
/// activity list.
#[cfg(feature = "ssr")]
pub fn get_student_activity_points(
    conn: &mut SqliteConnection,
    student_id: &str,
    activity_ids: &[String],
) -> Result<Vec<PointRecord>, diesel::result::Error> {
    if activity_ids.is_empty() {
        return Ok(Vec::new());
    }

    activity_points::table
        .filter(activity_points::student_id.eq(student_id))
        .filter(activity_points::activity_id.eq_any(activity_ids))
        .select(PointRecord::as_select())
        .load(conn)
}

/// Fetches every point record of an activity joined with its student, highest points first.
#[cfg(feature = "ssr")]
pub fn get_activity_points_with_students(
    conn: &mut SqliteConnection,
    activity_id: &str,
) -> Result<Vec<StudentPoints>, diesel::result::Error> {
    let rows: Vec<(PointRecord, Student)> = activity_points::table
        .inner_join(students::table)
        .filter(activity_points::activity_id.eq(activity_id))
        .order(activity_points::points.desc())
        .select((PointRecord::as_select(), Student::as_select()))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(record, student)| StudentPoints { record, student })
        .collect())
}

/// Fetches the roster of a class ordered by family name, then given name.
#[cfg(feature = "ssr")]
pub fn get_class_roster(
    conn: &mut SqliteConnection,
    class_id: &str,
) -> Result<Vec<Student>, diesel::result::Error> {
    students::table
        .filter(students::class_id.eq(class_id))
        .order((
            students::last_name.asc(),
            students::first_name.asc(),
            students::id.asc(),
        ))
        .select(Student::as_select())
        .load(conn)
}

#[cfg(all(test, feature = "ssr"))]
mod tests {
    use super::*;
    use crate::scoreboard::{
        rank_roster, ranked_rows, ActivityScoresQuery, FetchFailure, RankingQuery, ScoreSource,
    };
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use uuid::Uuid;

    const SCHEMA: &str = "
        CREATE TABLE activities (
            id TEXT PRIMARY KEY NOT NULL,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );
        CREATE TABLE students (
            id TEXT PRIMARY KEY NOT NULL,
            class_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        );
        CREATE TABLE activity_points (
            id TEXT PRIMARY KEY NOT NULL,
            activity_id TEXT NOT NULL REFERENCES activities (id),
            student_id TEXT NOT NULL REFERENCES students (id),
            points INTEGER NOT NULL DEFAULT 0,
            UNIQUE (activity_id, student_id)
        );
    ";

    // Helper to run a test against a fresh in-memory database with the classroom tables.
    fn run_test_with_schema<F>(test_fn: F)
    where
        F: FnOnce(&mut SqliteConnection) -> Result<(), diesel::result::Error>,
    {
        let mut conn =
            SqliteConnection::establish(":memory:").expect("Failed to open in-memory database");
        conn.batch_execute(SCHEMA).expect("Failed to create tables");
        test_fn(&mut conn).expect("Test query failed");
    }

    fn base_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn insert_activity(
        conn: &mut SqliteConnection,
        class_id: &str,
        name: &str,
        created_at: NaiveDateTime,
    ) -> Result<Activity, diesel::result::Error> {
        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            name: name.to_string(),
            created_at,
        };
        diesel::insert_into(activities::table)
            .values(&activity)
            .execute(conn)?;
        Ok(activity)
    }

    fn insert_student(
        conn: &mut SqliteConnection,
        class_id: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Student, diesel::result::Error> {
        let student = Student {
            id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        diesel::insert_into(students::table)
            .values(&student)
            .execute(conn)?;
        Ok(student)
    }

    fn insert_points(
        conn: &mut SqliteConnection,
        activity: &Activity,
        student: &Student,
        points: i32,
    ) -> Result<PointRecord, diesel::result::Error> {
        let record = PointRecord {
            id: Uuid::new_v4().to_string(),
            activity_id: activity.id.clone(),
            student_id: student.id.clone(),
            points,
        };
        diesel::insert_into(activity_points::table)
            .values(&record)
            .execute(conn)?;
        Ok(record)
    }

    // Drives the scoreboard loads straight against a diesel connection.
    struct ConnectionSource(RefCell<SqliteConnection>);

    impl ScoreSource for ConnectionSource {
        async fn class_activities(&self, class_id: &str) -> Result<Vec<Activity>, FetchFailure> {
            Ok(get_class_activities(&mut self.0.borrow_mut(), class_id)?)
        }

        async fn student_points(
            &self,
            student_id: &str,
            activity_ids: &[String],
        ) -> Result<Vec<PointRecord>, FetchFailure> {
            Ok(get_student_activity_points(
                &mut self.0.borrow_mut(),
                student_id,
                activity_ids,
            )?)
        }

        async fn activity_points(
            &self,
            activity_id: &str,
        ) -> Result<Vec<StudentPoints>, FetchFailure> {
            Ok(get_activity_points_with_students(
                &mut self.0.borrow_mut(),
                activity_id,
            )?)
        }

        async fn class_roster(&self, class_id: &str) -> Result<Vec<Student>, FetchFailure> {
            Ok(get_class_roster(&mut self.0.borrow_mut(), class_id)?)
        }
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("DATABASE_URL", "classroom.db"), ("DB_POOL_SIZE", "4")]);
        let config =
            DatabaseConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database_url, "classroom.db");
        assert_eq!(config.pool_size, 4);

        let config = DatabaseConfig::from_lookup(|key| {
            (key == "DATABASE_URL").then(|| "classroom.db".to_string())
        })
        .unwrap();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_config_errors() {
        let err = DatabaseConfig::from_lookup(|_| None).expect_err("Should require DATABASE_URL");
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let err = DatabaseConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("classroom.db".to_string()),
            _ => Some("0".to_string()),
        })
        .expect_err("Should reject a zero pool size");
        assert!(matches!(err, ConfigError::Invalid { name: "DB_POOL_SIZE", .. }));
    }

    #[test]
    fn test_pool_connections_are_read_only() {
        let pool = build_pool(&DatabaseConfig {
            database_url: ":memory:".to_string(),
            pool_size: 1,
        })
        .expect("Failed to build pool");
        let mut conn = pool.get().expect("Failed to get connection");

        assert!(conn.batch_execute("SELECT 1;").is_ok());
        assert!(conn.batch_execute("CREATE TABLE scratch (x INTEGER);").is_err());
    }

    #[test]
    fn test_get_class_activities_newest_first() {
        run_test_with_schema(|conn| {
            let older = insert_activity(conn, "c1", "Quiz", base_time())?;
            let newer = insert_activity(conn, "c1", "Lab", base_time() + Duration::days(3))?;
            insert_activity(conn, "c2", "Other class", base_time() + Duration::days(5))?;

            let fetched = get_class_activities(conn, "c1")?;
            let ids: Vec<&str> = fetched.iter().map(|a| a.id.as_str()).collect();
            assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
            assert_eq!(fetched[0].created_at, newer.created_at);

            assert!(get_class_activities(conn, "missing")?.is_empty());

            Ok(())
        });
    }

    #[test]
    fn test_get_student_activity_points_filters() {
        run_test_with_schema(|conn| {
            let quiz = insert_activity(conn, "c1", "Quiz", base_time())?;
            let lab = insert_activity(conn, "c1", "Lab", base_time())?;
            let essay = insert_activity(conn, "c1", "Essay", base_time())?;
            let ann = insert_student(conn, "c1", "Ann", "Able")?;
            let ben = insert_student(conn, "c1", "Ben", "Baker")?;
            let ann_quiz = insert_points(conn, &quiz, &ann, 7)?;
            insert_points(conn, &essay, &ann, 3)?;
            insert_points(conn, &lab, &ben, 9)?;

            let ids = vec![quiz.id.clone(), lab.id.clone()];
            let fetched = get_student_activity_points(conn, &ann.id, &ids)?;
            assert_eq!(fetched, vec![ann_quiz]);

            assert!(get_student_activity_points(conn, &ann.id, &[])?.is_empty());

            Ok(())
        });
    }

    #[test]
    fn test_get_activity_points_with_students_ordered() {
        run_test_with_schema(|conn| {
            let quiz = insert_activity(conn, "c1", "Quiz", base_time())?;
            let lab = insert_activity(conn, "c1", "Lab", base_time())?;
            let ann = insert_student(conn, "c1", "Ann", "Able")?;
            let ben = insert_student(conn, "c1", "Ben", "Baker")?;
            let cal = insert_student(conn, "c1", "Cal", "Cole")?;
            insert_points(conn, &quiz, &ann, 2)?;
            insert_points(conn, &quiz, &ben, 11)?;
            insert_points(conn, &quiz, &cal, 6)?;
            insert_points(conn, &lab, &ann, 40)?;

            let fetched = get_activity_points_with_students(conn, &quiz.id)?;
            let summary: Vec<(&str, i32)> = fetched
                .iter()
                .map(|row| (row.student.first_name.as_str(), row.record.points))
                .collect();
            assert_eq!(summary, vec![("Ben", 11), ("Cal", 6), ("Ann", 2)]);
            assert!(fetched.iter().all(|row| row.record.student_id == row.student.id));

            Ok(())
        });
    }

    #[test]
    fn test_get_class_roster_ordered_by_name() {
        run_test_with_schema(|conn| {
            insert_student(conn, "c1", "Zoe", "Baker")?;
            insert_student(conn, "c1", "Amy", "Baker")?;
            insert_student(conn, "c1", "Max", "Able")?;
            insert_student(conn, "c2", "Sam", "Aaron")?;

            let roster = get_class_roster(conn, "c1")?;
            let names: Vec<String> = roster.iter().map(Student::display_name).collect();
            assert_eq!(names, vec!["Able Max", "Baker Amy", "Baker Zoe"]);

            Ok(())
        });
    }

    #[test]
    fn test_rank_roster_from_database() {
        run_test_with_schema(|conn| {
            let quiz = insert_activity(conn, "c1", "Quiz", base_time())?;
            let alice = insert_student(conn, "c1", "Alice", "Adams")?;
            let bob = insert_student(conn, "c1", "Bob", "Brown")?;
            insert_points(conn, &quiz, &bob, 5)?;

            let records: Vec<PointRecord> = get_activity_points_with_students(conn, &quiz.id)?
                .into_iter()
                .map(|row| row.record)
                .collect();
            let ranked = rank_roster(get_class_roster(conn, "c1")?, &records);
            let rows = ranked_rows(&ranked);

            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].student_id, bob.id);
            assert_eq!(rows[0].points, 5);
            assert!(rows[0].is_leader);
            assert_eq!(rows[1].student_id, alice.id);
            assert_eq!(rows[1].points, 0);
            assert!(!rows[1].is_leader);

            Ok(())
        });
    }

    #[tokio::test]
    async fn test_scoreboard_loads_against_database() {
        let mut conn =
            SqliteConnection::establish(":memory:").expect("Failed to open in-memory database");
        conn.batch_execute(SCHEMA).expect("Failed to create tables");

        let quiz = insert_activity(&mut conn, "c1", "Quiz", base_time()).unwrap();
        let lab = insert_activity(&mut conn, "c1", "Lab", base_time() + Duration::hours(1)).unwrap();
        let ann = insert_student(&mut conn, "c1", "Ann", "Able").unwrap();
        let ben = insert_student(&mut conn, "c1", "Ben", "Baker").unwrap();
        insert_points(&mut conn, &quiz, &ann, 7).unwrap();
        insert_points(&mut conn, &quiz, &ben, 9).unwrap();

        let source = ConnectionSource(RefCell::new(conn));

        let summary = ActivityScoresQuery::new("c1", ann.id.clone())
            .load(&source)
            .await
            .expect("Summary load failed");
        let rows: Vec<(&str, i32)> = summary
            .iter()
            .map(|row| (row.activity.name.as_str(), row.points))
            .collect();
        assert_eq!(rows, vec![("Lab", 0), ("Quiz", 7)]);

        let ranking = RankingQuery::when_open(true, &lab)
            .expect("open")
            .load(&source)
            .await
            .expect("Ranking load failed");
        assert_eq!(ranking.len(), 2);
        assert!(ranking.iter().all(|score| score.points == 0));
    }
}
