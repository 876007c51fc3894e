use thiserror::Error;

use crate::models::Course;

/// Out-of-domain evaluator inputs. Recovered locally and only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("unknown rank {0:?}, evaluating as the lowest rank")]
    UnknownRank(String),

    #[error("invalid attendance count {0}, clamped to 0")]
    InvalidAttendanceCount(i64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("rank table must contain at least one rank")]
    EmptyRankTable,

    #[error("rank {0:?} appears more than once")]
    DuplicateRank(String),

    #[error("rank {0:?} has no threshold but is not the last rank")]
    MissingThreshold(String),

    #[error("rank {rank:?} threshold {threshold} is below the previous threshold {previous}")]
    DecreasingThreshold {
        rank: String,
        threshold: u32,
        previous: u32,
    },

    #[error("course {0} appears more than once in the alert precedence")]
    DuplicateCourse(Course),

    #[error("course {0} is missing from the alert precedence")]
    MissingCourse(Course),
}
