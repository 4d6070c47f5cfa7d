use std::collections::BTreeSet;

use tracing::instrument;

use crate::{
    error::RecResult,
    models::{sort_descending, MovieId, Neighbor, ScoredMovie, SimilarityMetric, UserId},
    store::{ensure_user, CacheKey, RatingsStore, SimilarityCache},
};

/// User-based collaborative filtering over a ratings store
///
/// Holds only shared references, so it is cheap to construct per call site.
/// Attach a [`SimilarityCache`] when the same similarities are requested
/// repeatedly (e.g. across neighbor sizes in an evaluation sweep).
pub struct Recommender<'a, S: RatingsStore + ?Sized> {
    pub(crate) store: &'a S,
    cache: Option<&'a SimilarityCache>,
}

impl<'a, S: RatingsStore + ?Sized> Clone for Recommender<'a, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            cache: self.cache,
        }
    }
}

impl<'a, S: RatingsStore + ?Sized> Recommender<'a, S> {
    /// Creates a recommender reading from `store`
    pub fn new(store: &'a S) -> Self {
        Self { store, cache: None }
    }

    /// Memoizes similarity scores in `cache`
    pub fn with_cache(mut self, cache: &'a SimilarityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Similarity of `a` to `b`, served from the cache when one is attached
    pub fn similarity(&self, metric: SimilarityMetric, a: UserId, b: UserId) -> RecResult<f64> {
        match self.cache {
            Some(cache) => cache.get_or_compute(CacheKey::new(metric, a, b), || {
                metric.compute(self.store, a, b)
            }),
            None => metric.compute(self.store, a, b),
        }
    }

    /// Top-`n` movies for `user`, ranked by predicted rating
    ///
    /// Candidates are the movies `user` has not rated, minus `exclude`.
    /// Predictions use the user's `neighbor_size` most similar users.
    #[instrument(skip(self, exclude), fields(excluded = exclude.len()))]
    pub fn top_n_recommendations(
        &self,
        user: UserId,
        metric: SimilarityMetric,
        n: usize,
        neighbor_size: usize,
        exclude: &BTreeSet<MovieId>,
    ) -> RecResult<Vec<ScoredMovie>> {
        let neighbors = self.top_n_similar_users(user, metric, neighbor_size)?;
        self.recommend_from_neighbors(user, &neighbors, n, exclude)
    }

    /// Same as [`Self::top_n_recommendations`] with a precomputed neighbor set
    pub fn recommend_from_neighbors(
        &self,
        user: UserId,
        neighbors: &[Neighbor],
        n: usize,
        exclude: &BTreeSet<MovieId>,
    ) -> RecResult<Vec<ScoredMovie>> {
        ensure_user(self.store, user)?;

        let candidates: Vec<MovieId> = self
            .store
            .movies_unrated_by_user(user)
            .into_iter()
            .filter(|movie| !exclude.contains(movie))
            .collect();

        let mut predicted = Vec::with_capacity(candidates.len());
        for movie in candidates {
            let rating = self.predict(user, movie, neighbors)?;
            predicted.push(ScoredMovie::new(movie, rating));
        }

        sort_descending(&mut predicted, |m| m.score);
        predicted.truncate(n);

        tracing::debug!(
            user,
            neighbors = neighbors.len(),
            returned = predicted.len(),
            "Recommendations computed"
        );

        Ok(predicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;
    use crate::store::InMemoryRatings;

    fn create_store() -> InMemoryRatings {
        let ratings = vec![
            // Target user has rated 1 and 2
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 1.0),
            // Agrees with user 1; loves 3, dislikes 4
            Rating::new(2, 1, 5.0),
            Rating::new(2, 2, 1.0),
            Rating::new(2, 3, 5.0),
            Rating::new(2, 4, 1.0),
            Rating::new(2, 5, 3.0),
            // Disagrees with user 1; opposite taste on 3 and 4
            Rating::new(3, 1, 1.0),
            Rating::new(3, 2, 5.0),
            Rating::new(3, 3, 1.0),
            Rating::new(3, 4, 5.0),
        ];
        InMemoryRatings::from_ratings(ratings)
    }

    #[test]
    fn test_recommends_only_unrated_movies() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        let recs = recommender
            .top_n_recommendations(1, SimilarityMetric::Pcc, 10, 5, &BTreeSet::new())
            .unwrap();

        let movies: Vec<MovieId> = recs.iter().map(|r| r.movie_id).collect();
        assert_eq!(movies.len(), 3);
        assert!(!movies.contains(&1));
        assert!(!movies.contains(&2));
    }

    #[test]
    fn test_ranking_follows_similar_users() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        let recs = recommender
            .top_n_recommendations(1, SimilarityMetric::Pcc, 10, 5, &BTreeSet::new())
            .unwrap();

        assert_eq!(recs[0].movie_id, 3);
        assert_eq!(recs.last().unwrap().movie_id, 4);
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_truncates_to_n() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        let recs = recommender
            .top_n_recommendations(1, SimilarityMetric::Pcc, 2, 5, &BTreeSet::new())
            .unwrap();
        assert_eq!(recs.len(), 2);
    }

    #[test]
    fn test_exclude_removes_candidates() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        let exclude = BTreeSet::from([3]);
        let recs = recommender
            .top_n_recommendations(1, SimilarityMetric::Pcc, 10, 5, &exclude)
            .unwrap();
        assert!(recs.iter().all(|r| r.movie_id != 3));
        assert_eq!(recs.len(), 2);
    }

    #[test]
    fn test_cached_similarity_matches_uncached() {
        let store = create_store();
        let cache = SimilarityCache::new();
        let plain = Recommender::new(&store);
        let cached = Recommender::new(&store).with_cache(&cache);

        for metric in SimilarityMetric::ALL {
            let expected = plain.similarity(metric, 1, 2).unwrap();
            assert_eq!(cached.similarity(metric, 1, 2).unwrap(), expected);
            assert_eq!(cached.similarity(metric, 1, 2).unwrap(), expected);
        }
        assert_eq!(cache.len(), SimilarityMetric::ALL.len());
    }

    #[test]
    fn test_unknown_user_is_an_error() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        assert!(recommender
            .top_n_recommendations(42, SimilarityMetric::Pcc, 10, 5, &BTreeSet::new())
            .is_err());
    }
}
