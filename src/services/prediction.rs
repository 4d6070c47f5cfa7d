use crate::{
    error::RecResult,
    models::{MovieId, Neighbor, UserId},
    store::RatingsStore,
};

use super::Recommender;

impl<'a, S: RatingsStore + ?Sized> Recommender<'a, S> {
    /// Predicted rating of `movie` by `user` from `neighbors`
    pub fn predict(&self, user: UserId, movie: MovieId, neighbors: &[Neighbor]) -> RecResult<f64> {
        predict(self.store, user, movie, neighbors)
    }
}

/// Mean-centered, similarity-weighted neighbor vote
///
/// Only neighbors who rated `movie` contribute. With no contributing weight
/// the prediction falls back to the user's own mean. The result is not
/// clamped to the rating scale.
pub fn predict<S: RatingsStore + ?Sized>(
    store: &S,
    user: UserId,
    movie: MovieId,
    neighbors: &[Neighbor],
) -> RecResult<f64> {
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for neighbor in neighbors {
        if !store.has_user_rated_movie(neighbor.user_id, movie) {
            continue;
        }
        numerator += neighbor.similarity * store.rating_mean_centered(neighbor.user_id, movie)?;
        denominator += neighbor.similarity.abs();
    }

    let user_mean = store.user_mean_rating(user)?;
    if denominator == 0.0 {
        return Ok(user_mean);
    }

    Ok(user_mean + numerator / denominator)
}
