//! Fetching, joining and ranking for the activity scoreboards.
//!
//! The components in [`crate::app`] only drive these types: a query is built from the current
//! parameters, loaded through a [`ScoreSource`], and its outcome folded into a [`LoadState`]
//! guarded by a [`FetchGeneration`] ticket.

use leptos::logging::error;
use leptos::prelude::ServerFnError;
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{Activity, ActivityScore, PointRecord, RankedScore, Student, StudentPoints};

pub const ACTIVITIES_LOAD_ERROR: &str = "Failed to load activities";
pub const SCOREBOARD_LOAD_ERROR: &str = "Failed to load scoreboard";

/// Any failure while reading from the data store. The detail is for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed: {detail}")]
pub struct FetchFailure {
    pub detail: String,
}

impl FetchFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl From<ServerFnError> for FetchFailure {
    fn from(err: ServerFnError) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(feature = "ssr")]
impl From<diesel::result::Error> for FetchFailure {
    fn from(err: diesel::result::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Read-only queries the scoreboards need from the data store.
#[allow(async_fn_in_trait)]
pub trait ScoreSource {
    /// Activities of a class, newest first.
    async fn class_activities(&self, class_id: &str) -> Result<Vec<Activity>, FetchFailure>;

    /// A student's point records restricted to the given activities.
    async fn student_points(
        &self,
        student_id: &str,
        activity_ids: &[String],
    ) -> Result<Vec<PointRecord>, FetchFailure>;

    /// Every point record of an activity with its student, highest points first.
    async fn activity_points(&self, activity_id: &str)
        -> Result<Vec<StudentPoints>, FetchFailure>;

    /// All students enrolled in a class.
    async fn class_roster(&self, class_id: &str) -> Result<Vec<Student>, FetchFailure>;
}

/// Pairs every activity with the student's points on it, defaulting to 0.
/// When several records match an activity the first one wins.
pub fn summarize_activity_scores(
    activities: Vec<Activity>,
    points: &[PointRecord],
) -> Vec<ActivityScore> {
    let mut by_activity: HashMap<&str, i32> = HashMap::new();
    for record in points {
        by_activity
            .entry(record.activity_id.as_str())
            .or_insert(record.points);
    }

    activities
        .into_iter()
        .map(|activity| {
            let points = by_activity
                .get(activity.id.as_str())
                .copied()
                .unwrap_or(0);
            ActivityScore { activity, points }
        })
        .collect()
}

/// Builds one entry per roster student and orders them by points, highest first. Students without
/// a record get 0. The sort is stable, so ties keep roster order.
pub fn rank_roster(roster: Vec<Student>, records: &[PointRecord]) -> Vec<RankedScore> {
    let mut by_student: HashMap<&str, i32> = HashMap::new();
    for record in records {
        by_student
            .entry(record.student_id.as_str())
            .or_insert(record.points);
    }

    let mut scores: Vec<RankedScore> = roster
        .into_iter()
        .map(|student| {
            let points = by_student.get(student.id.as_str()).copied().unwrap_or(0);
            RankedScore { student, points }
        })
        .collect();
    scores.sort_by(|a, b| b.points.cmp(&a.points));
    scores
}

/// A leaderboard line ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRow {
    pub rank: usize,
    pub student_id: String,
    pub display_name: String,
    pub points: i32,
    pub is_leader: bool,
}

/// Numbers an ordered leaderboard from 1. Only the first row is marked as the leader.
pub fn ranked_rows(scores: &[RankedScore]) -> Vec<RankedRow> {
    scores
        .iter()
        .enumerate()
        .map(|(index, score)| RankedRow {
            rank: index + 1,
            student_id: score.student.id.clone(),
            display_name: score.student.display_name(),
            points: score.points,
            is_leader: index == 0,
        })
        .collect()
}

/// Parameters of a student's activity summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityScoresQuery {
    pub class_id: String,
    pub student_id: String,
}

impl ActivityScoresQuery {
    pub fn new(class_id: impl Into<String>, student_id: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            student_id: student_id.into(),
        }
    }

    /// Fetches the class activities, then the student's points on them. Either failure aborts the
    /// whole load. Missing identifiers load nothing.
    pub async fn load<S: ScoreSource>(&self, source: &S) -> Result<Vec<ActivityScore>, FetchFailure> {
        if self.class_id.is_empty() || self.student_id.is_empty() {
            return Ok(Vec::new());
        }

        let activities = source.class_activities(&self.class_id).await?;
        if activities.is_empty() {
            return Ok(Vec::new());
        }

        let activity_ids: Vec<String> = activities.iter().map(|a| a.id.clone()).collect();
        let points = source
            .student_points(&self.student_id, &activity_ids)
            .await?;

        Ok(summarize_activity_scores(activities, &points))
    }
}

/// Parameters of an activity leaderboard. The class comes from the activity itself so the roster
/// resolves even before anyone has scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingQuery {
    pub activity_id: String,
    pub class_id: String,
}

impl RankingQuery {
    /// Returns a query only while the leaderboard is visible.
    pub fn when_open(is_open: bool, activity: &Activity) -> Option<Self> {
        is_open.then(|| Self {
            activity_id: activity.id.clone(),
            class_id: activity.class_id.clone(),
        })
    }

    /// Fetches the activity's point records, then the class roster, and ranks the roster.
    pub async fn load<S: ScoreSource>(&self, source: &S) -> Result<Vec<RankedScore>, FetchFailure> {
        if self.activity_id.is_empty() || self.class_id.is_empty() {
            return Ok(Vec::new());
        }

        let scored = source.activity_points(&self.activity_id).await?;
        let roster = source.class_roster(&self.class_id).await?;

        let records: Vec<PointRecord> = scored.into_iter().map(|s| s.record).collect();
        Ok(rank_roster(roster, &records))
    }
}

/// Lifecycle of one component's fetch sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<T> {
    Loading,
    Ready(T),
    Failed(&'static str),
}

impl<T> LoadState<T> {
    /// Logs the failure detail and keeps only the generic message for display.
    pub fn from_result(result: Result<T, FetchFailure>, message: &'static str) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(err) => {
                error!("{}: {}", message, err);
                Self::Failed(message)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Identifies one fetch sequence issued by a [`FetchGeneration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Counter that lets a component discard results of superseded fetches.
#[derive(Debug, Default)]
pub struct FetchGeneration {
    current: u64,
}

impl FetchGeneration {
    /// Starts a new fetch sequence. Every earlier ticket becomes stale.
    pub fn begin(&mut self) -> FetchTicket {
        self.current += 1;
        FetchTicket(self.current)
    }

    /// Makes every outstanding ticket stale without starting a new sequence.
    pub fn invalidate(&mut self) {
        self.current += 1;
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.current == ticket.0
    }
}

/// The activity whose leaderboard is open, if any. Only one can be open at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivitySelection(Option<Activity>);

impl ActivitySelection {
    pub fn select(&mut self, activity: Activity) {
        self.0 = Some(activity);
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn selected(&self) -> Option<&Activity> {
        self.0.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.0.is_some()
    }
}
