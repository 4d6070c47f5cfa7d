use std::collections::BTreeSet;

use crate::{
    error::{RecResult, RecommendError},
    models::{MovieId, UserId},
};

pub mod cache;
pub mod memory;

pub use cache::{CacheKey, SimilarityCache};
pub use memory::InMemoryRatings;

/// Read-only lookups over a ratings corpus
///
/// Set-valued lookups return ordered sets, so iteration order (and with it
/// tie-breaking in every ranked list) is deterministic.
///
/// Unknown users yield empty sets from the set-valued lookups and
/// [`RecommendError::UnknownUser`] from the scalar ones.
#[cfg_attr(test, mockall::automock)]
pub trait RatingsStore: Send + Sync {
    fn users(&self) -> BTreeSet<UserId>;

    fn movies(&self) -> BTreeSet<MovieId>;

    fn has_user(&self, user: UserId) -> bool;

    fn has_user_rated_movie(&self, user: UserId, movie: MovieId) -> bool;

    /// Fails with [`RecommendError::NotRated`] when the user has no rating for the movie
    fn rating(&self, user: UserId, movie: MovieId) -> RecResult<f64>;

    fn user_mean_rating(&self, user: UserId) -> RecResult<f64>;

    fn rating_mean_centered(&self, user: UserId, movie: MovieId) -> RecResult<f64> {
        Ok(self.rating(user, movie)? - self.user_mean_rating(user)?)
    }

    fn movies_rated_by_user(&self, user: UserId) -> BTreeSet<MovieId>;

    fn movies_unrated_by_user(&self, user: UserId) -> BTreeSet<MovieId> {
        let rated = self.movies_rated_by_user(user);
        self.movies()
            .into_iter()
            .filter(|movie| !rated.contains(movie))
            .collect()
    }

    fn common_movies(&self, a: UserId, b: UserId) -> BTreeSet<MovieId> {
        let rated_by_b = self.movies_rated_by_user(b);
        self.movies_rated_by_user(a)
            .into_iter()
            .filter(|movie| rated_by_b.contains(movie))
            .collect()
    }
}

/// Fails with [`RecommendError::UnknownUser`] unless the store knows `user`
pub fn ensure_user<S: RatingsStore + ?Sized>(store: &S, user: UserId) -> RecResult<()> {
    if store.has_user(user) {
        Ok(())
    } else {
        Err(RecommendError::UnknownUser(user))
    }
}
