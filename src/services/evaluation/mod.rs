//! Prediction-accuracy evaluation
//!
//! Splits rating records into training and test data, predicts every test
//! rating from the training data, and reports MAE and RMSE.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{RecResult, RecommendError},
    models::{Rating, SimilarityMetric},
    services::Recommender,
    store::{InMemoryRatings, RatingsStore},
};

mod sweep;

pub use sweep::{cross_validate, run_sweep, MetricSeries, SweepPlan, SweepReport};

/// Upper end of the rating scale, used when clamping predictions
pub const MAX_RATING: f64 = 5.0;

fn shuffled(ratings: &[Rating], shuffle: bool, random_state: Option<u64>) -> Vec<Rating> {
    let mut rows = ratings.to_vec();
    if shuffle {
        match random_state {
            Some(seed) => rows.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed)),
            None => rows.shuffle(&mut rand::thread_rng()),
        }
    }
    rows
}

/// Single train/test split by percentage
///
/// ```
/// use cinematch::models::Rating;
/// use cinematch::services::evaluation::TrainTestSplit;
///
/// let ratings: Vec<Rating> = (0..10).map(|i| Rating::new(1, i, 3.0)).collect();
/// let (train, test) = TrainTestSplit::new(0.7).split(&ratings);
/// assert_eq!((train.len(), test.len()), (7, 3));
/// ```
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    train_ratio: f64,
    shuffle: bool,
    random_state: Option<u64>,
}

impl TrainTestSplit {
    /// `train_ratio` is clamped to [0, 1]
    pub fn new(train_ratio: f64) -> Self {
        Self {
            train_ratio: train_ratio.clamp(0.0, 1.0),
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set random state for reproducible shuffling.
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self.shuffle = true;
        self
    }

    /// First floor(N * ratio) rows train, the rest test
    pub fn split(&self, ratings: &[Rating]) -> (Vec<Rating>, Vec<Rating>) {
        let mut rows = shuffled(ratings, self.shuffle, self.random_state);
        let train_size = (rows.len() as f64 * self.train_ratio) as usize;
        let test = rows.split_off(train_size);
        (rows, test)
    }
}

impl From<&Config> for TrainTestSplit {
    /// A configured seed implies shuffling
    fn from(config: &Config) -> Self {
        let split = Self::new(config.train_ratio).with_shuffle(config.shuffle);
        match config.seed {
            Some(seed) => split.with_random_state(seed),
            None => split,
        }
    }
}

/// Partition into k folds of roughly equal size
///
/// Every fold holds N / k rows except the last, which also takes the
/// remainder.
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Set random state for reproducible shuffling.
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self.shuffle = true;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, ratings: &[Rating]) -> RecResult<Vec<Vec<Rating>>> {
        if self.n_splits == 0 || self.n_splits > ratings.len() {
            return Err(RecommendError::InvalidInput(format!(
                "cannot split {} ratings into {} folds",
                ratings.len(),
                self.n_splits
            )));
        }

        let mut rows = shuffled(ratings, self.shuffle, self.random_state);
        let fold_size = rows.len() / self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        for _ in 0..self.n_splits - 1 {
            let rest = rows.split_off(fold_size);
            folds.push(rows);
            rows = rest;
        }
        folds.push(rows);

        Ok(folds)
    }
}

impl From<&Config> for KFold {
    /// A configured seed implies shuffling
    fn from(config: &Config) -> Self {
        let kfold = Self::new(config.folds).with_shuffle(config.shuffle);
        match config.seed {
            Some(seed) => kfold.with_random_state(seed),
            None => kfold,
        }
    }
}

/// MAE/RMSE for one (metric, neighbor size) cell
///
/// `samples == 0` marks a cell with nothing to measure; its zero errors are
/// placeholders, not a perfect score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellScore {
    pub neighbor_size: usize,
    pub mae: f64,
    pub rmse: f64,
    pub samples: usize,
}

impl CellScore {
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

/// Running sums of prediction errors
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAccumulator {
    abs_sum: f64,
    sq_sum: f64,
    samples: usize,
}

impl ErrorAccumulator {
    pub fn push(&mut self, predicted: f64, actual: f64) {
        let error = predicted - actual;
        self.abs_sum += error.abs();
        self.sq_sum += error * error;
        self.samples += 1;
    }

    /// Adds a finished cell back in, weighted by its sample count
    pub fn merge_cell(&mut self, cell: &CellScore) {
        let n = cell.samples as f64;
        self.abs_sum += cell.mae * n;
        self.sq_sum += cell.rmse * cell.rmse * n;
        self.samples += cell.samples;
    }

    pub fn finish(&self, neighbor_size: usize) -> CellScore {
        if self.samples == 0 {
            return CellScore {
                neighbor_size,
                mae: 0.0,
                rmse: 0.0,
                samples: 0,
            };
        }
        let n = self.samples as f64;
        CellScore {
            neighbor_size,
            mae: self.abs_sum / n,
            rmse: (self.sq_sum / n).sqrt(),
            samples: self.samples,
        }
    }
}

/// Scores one (metric, neighbor size) combination
///
/// Every test user known to the training data gets its `neighbor_size`
/// nearest training users; each of the user's test ratings is then predicted
/// from them. Users absent from training are skipped.
pub fn evaluate_cell<S: RatingsStore + ?Sized>(
    recommender: &Recommender<'_, S>,
    test: &InMemoryRatings,
    metric: SimilarityMetric,
    neighbor_size: usize,
    clamp_predictions: bool,
) -> RecResult<CellScore> {
    let train = recommender.store();
    let mut errors = ErrorAccumulator::default();

    for user in test.users() {
        if !train.has_user(user) {
            continue;
        }

        let neighbors = recommender.top_n_similar_users(user, metric, neighbor_size)?;

        for (movie, actual) in test.user_ratings(user).into_iter().flatten() {
            let mut predicted = recommender.predict(user, *movie, &neighbors)?;
            if clamp_predictions {
                predicted = predicted.min(MAX_RATING);
            }
            errors.push(predicted, *actual);
        }
    }

    let score = errors.finish(neighbor_size);
    if score.is_empty() {
        tracing::warn!(%metric, neighbor_size, "No test ratings could be evaluated");
    } else {
        tracing::debug!(
            %metric,
            neighbor_size,
            mae = score.mae,
            rmse = score.rmse,
            samples = score.samples,
            "Cell evaluated"
        );
    }

    Ok(score)
}

/// Convenience wrapper: builds stores from raw splits and scores one cell
pub fn evaluate(
    train: &[Rating],
    test: &[Rating],
    metric: SimilarityMetric,
    neighbor_size: usize,
) -> RecResult<CellScore> {
    let train = InMemoryRatings::from_ratings(train.to_vec());
    let test = InMemoryRatings::from_ratings(test.to_vec());
    evaluate_cell(&Recommender::new(&train), &test, metric, neighbor_size, true)
}
