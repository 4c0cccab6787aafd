use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable, Insertable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::activities))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct Activity {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub created_at: NaiveDateTime,
}

/// Points a single student earned on a single activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable, Insertable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::activity_points))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct PointRecord {
    pub id: String,
    pub activity_id: String,
    pub student_id: String,
    pub points: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable, Insertable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::students))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct Student {
    pub id: String,
    pub class_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Student {
    /// Name as shown on the class scoreboard, family name first.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// A point record together with the student it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPoints {
    pub record: PointRecord,
    pub student: Student,
}

/// One row of a student's activity summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityScore {
    pub activity: Activity,
    pub points: i32,
}

/// One entry of an activity leaderboard. Students without a record carry 0 points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedScore {
    pub student: Student,
    pub points: i32,
}
