use serde::{Deserialize, Serialize};

mod metric;
mod movie;

pub use metric::SimilarityMetric;
pub use movie::Movie;

pub type UserId = u32;
pub type MovieId = u32;

/// A single (user, movie, rating) record
///
/// Ratings are on a 1-5 scale; a user rates a movie at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: f64,
    /// Seconds since the Unix epoch, when known
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Rating {
    pub fn new(user_id: UserId, movie_id: MovieId, rating: f64) -> Self {
        Self {
            user_id,
            movie_id,
            rating,
            timestamp: None,
        }
    }
}

/// Another user contributing evidence to a prediction, with its similarity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Neighbor {
    pub user_id: UserId,
    pub similarity: f64,
}

/// A movie paired with a (predicted or aggregated) score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoredMovie {
    pub movie_id: MovieId,
    pub score: f64,
}

impl ScoredMovie {
    pub fn new(movie_id: MovieId, score: f64) -> Self {
        Self { movie_id, score }
    }
}

/// How much of a member's own best list the group list delivered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Satisfaction {
    pub user_id: UserId,
    pub score: f64,
}

/// Sorts scored items descending, keeping the incoming order on ties.
pub(crate) fn sort_descending<T>(items: &mut [T], score: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
