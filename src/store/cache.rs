use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Display;

use crate::error::RecResult;
use crate::models::{SimilarityMetric, UserId};

/// Key for a memoized similarity score
///
/// Symmetric metrics store the pair in ascending order so (a, b) and (b, a)
/// share one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    metric: SimilarityMetric,
    first: UserId,
    second: UserId,
}

impl CacheKey {
    pub fn new(metric: SimilarityMetric, a: UserId, b: UserId) -> Self {
        let (first, second) = if metric.is_symmetric() && b < a {
            (b, a)
        } else {
            (a, b)
        };
        Self {
            metric,
            first,
            second,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sim:{}:{}:{}", self.metric, self.first, self.second)
    }
}

/// In-process memo of similarity scores
///
/// Single-threaded: each evaluation task builds its own inside its blocking
/// closure, so entries written by one metric stay invisible to the others.
#[derive(Debug, Default)]
pub struct SimilarityCache {
    entries: RefCell<HashMap<CacheKey, f64>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl SimilarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a cached score
    pub fn get_from_cache(&self, key: &CacheKey) -> Option<f64> {
        let value = self.entries.borrow().get(key).copied();
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.set(counter.get() + 1);
        value
    }

    pub fn set_in_cache(&self, key: CacheKey, value: f64) {
        self.entries.borrow_mut().insert(key, value);
    }

    /// Returns the cached score for `key`, computing and storing it on a miss
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> RecResult<f64>
    where
        F: FnOnce() -> RecResult<f64>,
    {
        if let Some(cached) = self.get_from_cache(&key) {
            return Ok(cached);
        }
        let value = compute()?;
        self.set_in_cache(key, value);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.get(), self.misses.get())
    }
}
