use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    error::{RecResult, RecommendError},
    models::{Movie, MovieId, Rating, UserId},
};

use super::RatingsStore;

/// Immutable ratings corpus held in memory
///
/// Built once from rating records (and optionally a movie catalog); per-user
/// rating maps and means are computed at construction. Share it behind an
/// `Arc` when several evaluation tasks need it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRatings {
    records: Vec<Rating>,
    user_ratings: BTreeMap<UserId, BTreeMap<MovieId, f64>>,
    user_means: HashMap<UserId, f64>,
    movie_means: HashMap<MovieId, f64>,
    movie_ids: BTreeSet<MovieId>,
    catalog: BTreeMap<MovieId, Movie>,
}

impl InMemoryRatings {
    /// Builds a store from rating records alone
    pub fn from_ratings(ratings: Vec<Rating>) -> Self {
        Self::new(ratings, Vec::new())
    }

    /// Builds a store from rating records and a movie catalog
    ///
    /// A later record for the same (user, movie) pair replaces an earlier one.
    pub fn new(ratings: Vec<Rating>, movies: Vec<Movie>) -> Self {
        let mut keep: HashMap<(UserId, MovieId), usize> = HashMap::new();
        for (index, record) in ratings.iter().enumerate() {
            keep.insert((record.user_id, record.movie_id), index);
        }
        let records: Vec<Rating> = ratings
            .into_iter()
            .enumerate()
            .filter(|(index, r)| keep.get(&(r.user_id, r.movie_id)) == Some(index))
            .map(|(_, r)| r)
            .collect();

        let mut user_ratings: BTreeMap<UserId, BTreeMap<MovieId, f64>> = BTreeMap::new();
        for record in &records {
            user_ratings
                .entry(record.user_id)
                .or_default()
                .insert(record.movie_id, record.rating);
        }

        let user_means = user_ratings
            .iter()
            .map(|(user, ratings)| {
                let mean = ratings.values().sum::<f64>() / ratings.len() as f64;
                (*user, mean)
            })
            .collect();

        let mut movie_totals: HashMap<MovieId, (f64, usize)> = HashMap::new();
        for record in &records {
            let (sum, count) = movie_totals.entry(record.movie_id).or_default();
            *sum += record.rating;
            *count += 1;
        }
        let movie_means = movie_totals
            .into_iter()
            .map(|(movie, (sum, count))| (movie, sum / count as f64))
            .collect();

        let catalog: BTreeMap<MovieId, Movie> =
            movies.into_iter().map(|movie| (movie.id, movie)).collect();

        let movie_ids = catalog
            .keys()
            .copied()
            .chain(records.iter().map(|r| r.movie_id))
            .collect();

        tracing::debug!(
            ratings = records.len(),
            users = user_ratings.len(),
            catalog = catalog.len(),
            "Ratings store built"
        );

        Self {
            records,
            user_ratings,
            user_means,
            movie_means,
            movie_ids,
            catalog,
        }
    }

    /// Number of rating records kept
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rating records in input order
    pub fn ratings(&self) -> &[Rating] {
        &self.records
    }

    /// A user's ratings keyed by movie
    pub fn user_ratings(&self, user: UserId) -> Option<&BTreeMap<MovieId, f64>> {
        self.user_ratings.get(&user)
    }

    pub fn movie(&self, movie: MovieId) -> Option<&Movie> {
        self.catalog.get(&movie)
    }

    pub fn movie_title(&self, movie: MovieId) -> Option<&str> {
        self.catalog.get(&movie).map(|m| m.title.as_str())
    }

    pub fn movie_genres(&self, movie: MovieId) -> Option<&[String]> {
        self.catalog.get(&movie).map(|m| m.genres.as_slice())
    }

    /// Every genre tag present in the catalog, sorted
    pub fn genres(&self) -> BTreeSet<&str> {
        self.catalog
            .values()
            .flat_map(|m| m.genres.iter().map(String::as_str))
            .collect()
    }

    /// Mean of all ratings given to a movie, `None` if nobody rated it
    pub fn movie_mean_rating(&self, movie: MovieId) -> Option<f64> {
        self.movie_means.get(&movie).copied()
    }

    /// Number of records per distinct rating value, keyed by the value in tenths
    /// (4.5 stars -> 45) so the map stays totally ordered
    pub fn rating_histogram(&self) -> BTreeMap<u32, usize> {
        let mut histogram = BTreeMap::new();
        for record in &self.records {
            let key = (record.rating * 10.0).round() as u32;
            *histogram.entry(key).or_insert(0) += 1;
        }
        histogram
    }
}

impl RatingsStore for InMemoryRatings {
    fn users(&self) -> BTreeSet<UserId> {
        self.user_ratings.keys().copied().collect()
    }

    fn movies(&self) -> BTreeSet<MovieId> {
        self.movie_ids.clone()
    }

    fn has_user(&self, user: UserId) -> bool {
        self.user_ratings.contains_key(&user)
    }

    fn has_user_rated_movie(&self, user: UserId, movie: MovieId) -> bool {
        self.user_ratings
            .get(&user)
            .is_some_and(|ratings| ratings.contains_key(&movie))
    }

    fn rating(&self, user: UserId, movie: MovieId) -> RecResult<f64> {
        self.user_ratings
            .get(&user)
            .ok_or(RecommendError::UnknownUser(user))?
            .get(&movie)
            .copied()
            .ok_or(RecommendError::NotRated { user, movie })
    }

    fn user_mean_rating(&self, user: UserId) -> RecResult<f64> {
        self.user_means
            .get(&user)
            .copied()
            .ok_or(RecommendError::UnknownUser(user))
    }

    fn movies_rated_by_user(&self, user: UserId) -> BTreeSet<MovieId> {
        self.user_ratings
            .get(&user)
            .map(|ratings| ratings.keys().copied().collect())
            .unwrap_or_default()
    }

    fn common_movies(&self, a: UserId, b: UserId) -> BTreeSet<MovieId> {
        match (self.user_ratings.get(&a), self.user_ratings.get(&b)) {
            (Some(ra), Some(rb)) => ra.keys().filter(|m| rb.contains_key(m)).copied().collect(),
            _ => BTreeSet::new(),
        }
    }
}
