use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Course {
    Esa,
    Cfo,
}

impl Course {
    pub const ALL: [Course; 2] = [Course::Esa, Course::Cfo];
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Course::Esa => f.write_str("ESA"),
            Course::Cfo => f.write_str("CFO"),
        }
    }
}

/// Completion state of a course. Rows store this as a nullable boolean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CourseStatus {
    Done,
    NotDone,
    #[default]
    Unset,
}

impl From<Option<bool>> for CourseStatus {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => CourseStatus::Done,
            Some(false) => CourseStatus::NotDone,
            None => CourseStatus::Unset,
        }
    }
}

impl From<CourseStatus> for Option<bool> {
    fn from(value: CourseStatus) -> Self {
        match value {
            CourseStatus::Done => Some(true),
            CourseStatus::NotDone => Some(false),
            CourseStatus::Unset => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSnapshot {
    pub rank: String,
    pub total_attendances: i64,
    pub esa_course: CourseStatus,
    pub cfo_course: CourseStatus,
    pub merit_promotion: bool,
}

impl MemberSnapshot {
    pub fn course_status(&self, course: Course) -> CourseStatus {
        match course {
            Course::Esa => self.esa_course,
            Course::Cfo => self.cfo_course,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberRecord {
    pub id: Uuid,
    pub nickname: String,
    pub email: String,
    #[serde(flatten)]
    pub snapshot: MemberSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rank", rename_all = "snake_case")]
pub enum NextRank {
    Rank(String),
    MaximumRank,
    MeritPromotion,
}

impl fmt::Display for NextRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextRank::Rank(name) => f.write_str(name),
            NextRank::MaximumRank => f.write_str("Maximum Rank"),
            NextRank::MeritPromotion => f.write_str("Merit Promotion"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankProgress {
    /// Rank the window was computed from; the lowest rank when the stored one is unknown.
    pub current_rank: String,
    pub next_rank: NextRank,
    pub progress_percentage: Option<f64>,
    pub attendances_needed: Option<u32>,
    pub next_rank_threshold: Option<u32>,
}

impl RankProgress {
    pub fn is_maximum(&self) -> bool {
        self.next_rank == NextRank::MaximumRank
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseAlert {
    pub course: Course,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberProgress {
    pub member: MemberRecord,
    pub progress: RankProgress,
    pub course_alert: Option<CourseAlert>,
    pub promotion_suggested: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankSummary {
    pub rank: String,
    pub member_count: usize,
    pub avg_attendances: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceTrend {
    pub week_start: NaiveDate,
    pub attendance_count: i64,
    pub member_count: i64,
}
