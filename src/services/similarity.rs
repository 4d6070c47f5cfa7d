//! User-user similarity functions
//!
//! Plain Pearson correlation drifts toward +/-1 when two users share only one
//! or two movies; the weighted variants damp it by how much the rating sets
//! actually overlap.

use crate::{
    error::RecResult,
    models::{SimilarityMetric, UserId},
    store::RatingsStore,
};

impl SimilarityMetric {
    /// Similarity of `a` to `b` under this metric
    pub fn compute<S: RatingsStore + ?Sized>(
        &self,
        store: &S,
        a: UserId,
        b: UserId,
    ) -> RecResult<f64> {
        match self {
            SimilarityMetric::Pcc => pcc(store, a, b),
            SimilarityMetric::Jaccard => Ok(jaccard(store, a, b)),
            SimilarityMetric::WeightedPccJaccard => wpcc_jaccard(store, a, b),
            SimilarityMetric::WeightedPccCoverage => wpcc_coverage(store, a, b),
        }
    }
}

/// Pearson correlation over the movies both users rated
///
/// Ratings are centered on each user's mean over all of their ratings, not
/// only the shared ones. Returns 0 for an empty overlap or zero variance.
pub fn pcc<S: RatingsStore + ?Sized>(store: &S, a: UserId, b: UserId) -> RecResult<f64> {
    let common = store.common_movies(a, b);
    if common.is_empty() {
        return Ok(0.0);
    }

    let mut numerator = 0.0;
    let mut sum_sq_a = 0.0;
    let mut sum_sq_b = 0.0;

    for movie in common {
        let centered_a = store.rating_mean_centered(a, movie)?;
        let centered_b = store.rating_mean_centered(b, movie)?;

        numerator += centered_a * centered_b;
        sum_sq_a += centered_a * centered_a;
        sum_sq_b += centered_b * centered_b;
    }

    let denominator = sum_sq_a.sqrt() * sum_sq_b.sqrt();
    if denominator == 0.0 {
        return Ok(0.0);
    }

    Ok(numerator / denominator)
}

/// Shared movies over all movies rated by either user
pub fn jaccard<S: RatingsStore + ?Sized>(store: &S, a: UserId, b: UserId) -> f64 {
    let rated_a = store.movies_rated_by_user(a);
    let rated_b = store.movies_rated_by_user(b);

    let union = rated_a.union(&rated_b).count();
    if union == 0 {
        return 0.0;
    }

    rated_a.intersection(&rated_b).count() as f64 / union as f64
}

/// Pearson correlation scaled by Jaccard overlap
pub fn wpcc_jaccard<S: RatingsStore + ?Sized>(store: &S, a: UserId, b: UserId) -> RecResult<f64> {
    Ok(pcc(store, a, b)? * jaccard(store, a, b))
}

/// Pearson correlation scaled by |common| / |rated by b|
///
/// Asymmetric: a `b` who rated far more movies than the two share is
/// penalized.
pub fn wpcc_coverage<S: RatingsStore + ?Sized>(
    store: &S,
    a: UserId,
    b: UserId,
) -> RecResult<f64> {
    let rated_by_b = store.movies_rated_by_user(b).len();
    if rated_by_b == 0 {
        return Ok(0.0);
    }

    let weight = store.common_movies(a, b).len() as f64 / rated_by_b as f64;
    Ok(pcc(store, a, b)? * weight)
}
