use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::RecommendError;

/// Selectable user-user similarity function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SimilarityMetric {
    /// Pearson correlation over co-rated movies
    #[serde(rename = "pcc", alias = "pearson", alias = "sim_pcc")]
    Pcc,
    /// Co-rated movies over the union of rated movies
    #[serde(rename = "jaccard", alias = "sim_jaccard")]
    Jaccard,
    /// Pearson damped by Jaccard overlap
    #[serde(rename = "wpcc_jaccard", alias = "sim_wpcc_jaccard")]
    WeightedPccJaccard,
    /// Pearson damped by the share of the second user's ratings that overlap
    #[serde(
        rename = "wpcc_coverage",
        alias = "wpcc_common_movies",
        alias = "sim_wpcc_common_movies"
    )]
    WeightedPccCoverage,
}

impl SimilarityMetric {
    pub const ALL: [SimilarityMetric; 4] = [
        SimilarityMetric::Pcc,
        SimilarityMetric::Jaccard,
        SimilarityMetric::WeightedPccJaccard,
        SimilarityMetric::WeightedPccCoverage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SimilarityMetric::Pcc => "pcc",
            SimilarityMetric::Jaccard => "jaccard",
            SimilarityMetric::WeightedPccJaccard => "wpcc_jaccard",
            SimilarityMetric::WeightedPccCoverage => "wpcc_coverage",
        }
    }

    /// Whether sim(a, b) == sim(b, a) for every pair
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, SimilarityMetric::WeightedPccCoverage)
    }

    /// Parses a list of names, failing on the first unknown one
    pub fn parse_all<I, T>(names: I) -> Result<Vec<Self>, RecommendError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        names.into_iter().map(|name| name.as_ref().parse()).collect()
    }
}

impl Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SimilarityMetric {
    type Err = RecommendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pcc" | "pearson" | "sim_pcc" => Ok(SimilarityMetric::Pcc),
            "jaccard" | "sim_jaccard" => Ok(SimilarityMetric::Jaccard),
            "wpcc_jaccard" | "sim_wpcc_jaccard" => Ok(SimilarityMetric::WeightedPccJaccard),
            "wpcc_coverage" | "wpcc_common_movies" | "sim_wpcc_common_movies" => {
                Ok(SimilarityMetric::WeightedPccCoverage)
            }
            _ => Err(RecommendError::UnknownMetric(s.to_string())),
        }
    }
}
