use crate::models::{MovieId, UserId};

/// Errors surfaced by the recommendation pipeline
///
/// Degenerate statistics (empty overlaps, zero variance) never show up here;
/// they resolve to documented fallback values where they occur.
#[derive(thiserror::Error, Debug)]
pub enum RecommendError {
    #[error("Unknown similarity metric '{0}' (expected one of: pcc, jaccard, wpcc_jaccard, wpcc_coverage)")]
    UnknownMetric(String),

    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("User {user} has not rated movie {movie}")]
    NotRated { user: UserId, movie: MovieId },

    #[error("Satisfaction undefined for user {user}: individual recommendations sum to zero")]
    ZeroSatisfactionBaseline { user: UserId },

    #[error("Group has no members")]
    EmptyGroup,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Evaluation of metric {metric} produced no result within {waited_secs}s")]
    CellTimeout { metric: String, waited_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RecResult<T> = Result<T, RecommendError>;
