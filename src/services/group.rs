use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    config::Config,
    error::{RecResult, RecommendError},
    models::{sort_descending, MovieId, Neighbor, Satisfaction, ScoredMovie, SimilarityMetric, UserId},
    store::RatingsStore,
};

use super::Recommender;

/// Added to the standard deviation so unanimous rows stay finite
pub const DISAGREEMENT_EPSILON: f64 = 1e-4;

/// How a row of member ratings collapses into one group score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Mean of the members' ratings
    Average,
    /// Lowest member rating
    LeastMisery,
    /// Mean scaled by 1 / (std + epsilon): agreement boosts, disagreement suppresses
    WeightedAverage,
}

impl AggregationStrategy {
    pub fn score(&self, ratings: &[f64]) -> f64 {
        match self {
            AggregationStrategy::Average => mean(ratings),
            AggregationStrategy::LeastMisery => {
                ratings.iter().copied().fold(f64::INFINITY, f64::min)
            }
            AggregationStrategy::WeightedAverage => {
                mean(ratings) * (1.0 / (std_dev(ratings) + DISAGREEMENT_EPSILON))
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Knobs shared by group and sequential recommendation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupOptions {
    pub metric: SimilarityMetric,
    /// Length of each individual list and of the group list
    pub n: usize,
    pub neighbor_size: usize,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::Pcc,
            n: 10,
            neighbor_size: 50,
        }
    }
}

impl From<&Config> for GroupOptions {
    fn from(config: &Config) -> Self {
        Self {
            metric: config.group_metric,
            n: config.recommendation_count,
            neighbor_size: config.neighbor_size,
        }
    }
}

/// One member's neighbor set and individual top-N list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberRecommendations {
    pub user_id: UserId,
    pub neighbors: Vec<Neighbor>,
    pub recommendations: Vec<ScoredMovie>,
}

impl MemberRecommendations {
    /// Sum of the member's own predicted ratings
    pub fn individual_value(&self) -> f64 {
        self.recommendations.iter().map(|r| r.score).sum()
    }
}

/// Candidate movies with one rating per member
///
/// Position `i` of every row belongs to `members()[i]`; satisfaction reads
/// ratings back by that index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationTable {
    members: Vec<UserId>,
    rows: Vec<(MovieId, Vec<f64>)>,
}

impl AggregationTable {
    /// Builds a table from explicit rows
    ///
    /// Fails with [`RecommendError::InvalidInput`] unless every row holds
    /// exactly one rating per member.
    pub fn new(members: Vec<UserId>, rows: Vec<(MovieId, Vec<f64>)>) -> RecResult<Self> {
        if let Some((movie, ratings)) = rows.iter().find(|(_, r)| r.len() != members.len()) {
            return Err(RecommendError::InvalidInput(format!(
                "row for movie {} has {} ratings, expected one per member ({})",
                movie,
                ratings.len(),
                members.len()
            )));
        }
        Ok(Self { members, rows })
    }

    pub fn members(&self) -> &[UserId] {
        &self.members
    }

    /// Rows in candidate order (first appearance across members' lists)
    pub fn rows(&self) -> &[(MovieId, Vec<f64>)] {
        &self.rows
    }

    pub fn row(&self, movie: MovieId) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|(id, _)| *id == movie)
            .map(|(_, ratings)| ratings.as_slice())
    }

    pub fn movies(&self) -> impl Iterator<Item = MovieId> + '_ {
        self.rows.iter().map(|(movie, _)| *movie)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Top-`n` movies under `strategy`
    pub fn rank(&self, strategy: AggregationStrategy, n: usize) -> Vec<ScoredMovie> {
        self.rank_by(n, |ratings| strategy.score(ratings))
    }

    /// Top-`n` movies under an arbitrary row score; ties keep candidate order
    pub fn rank_by(&self, n: usize, score: impl Fn(&[f64]) -> f64) -> Vec<ScoredMovie> {
        let mut ranked: Vec<ScoredMovie> = self
            .rows
            .iter()
            .map(|(movie, ratings)| ScoredMovie::new(*movie, score(ratings.as_slice())))
            .collect();
        sort_descending(&mut ranked, |m| m.score);
        ranked.truncate(n);
        ranked
    }
}

/// Result of one group recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRecommendation {
    pub members: Vec<MemberRecommendations>,
    pub table: AggregationTable,
    pub recommendations: Vec<ScoredMovie>,
}

/// Aggregates members' individual recommendations into one group list
pub struct GroupRecommender<'a, S: RatingsStore + ?Sized> {
    recommender: Recommender<'a, S>,
    options: GroupOptions,
}

impl<'a, S: RatingsStore + ?Sized> GroupRecommender<'a, S> {
    pub fn new(recommender: Recommender<'a, S>, options: GroupOptions) -> Self {
        Self {
            recommender,
            options,
        }
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    /// Ranks the group's candidates under `strategy`
    #[instrument(skip(self))]
    pub fn recommend(
        &self,
        group: &[UserId],
        strategy: AggregationStrategy,
    ) -> RecResult<GroupRecommendation> {
        let members = self.member_recommendations(group, &BTreeSet::new())?;
        let table = self.aggregation_table(&members)?;
        let recommendations = table.rank(strategy, self.options.n);

        tracing::debug!(
            candidates = table.len(),
            returned = recommendations.len(),
            "Group recommendations computed"
        );

        Ok(GroupRecommendation {
            members,
            table,
            recommendations,
        })
    }

    /// Each member's neighbors and individual top-N list, in group order
    ///
    /// Duplicate ids in `group` are dropped (first occurrence kept).
    pub fn member_recommendations(
        &self,
        group: &[UserId],
        exclude: &BTreeSet<MovieId>,
    ) -> RecResult<Vec<MemberRecommendations>> {
        let members = group_order(group)?;

        members
            .into_iter()
            .map(|user_id| {
                let neighbors = self.recommender.top_n_similar_users(
                    user_id,
                    self.options.metric,
                    self.options.neighbor_size,
                )?;
                let recommendations = self.recommender.recommend_from_neighbors(
                    user_id,
                    &neighbors,
                    self.options.n,
                    exclude,
                )?;
                Ok(MemberRecommendations {
                    user_id,
                    neighbors,
                    recommendations,
                })
            })
            .collect()
    }

    /// Builds the member x candidate table
    ///
    /// Candidates are the union of the members' lists. A member who rated a
    /// candidate contributes the real rating; otherwise a prediction from
    /// that member's own neighbor set.
    pub fn aggregation_table(&self, members: &[MemberRecommendations]) -> RecResult<AggregationTable> {
        let store = self.recommender.store();

        let mut seen = HashSet::new();
        let candidates: Vec<MovieId> = members
            .iter()
            .flat_map(|m| m.recommendations.iter().map(|r| r.movie_id))
            .filter(|movie| seen.insert(*movie))
            .collect();

        let mut rows = Vec::with_capacity(candidates.len());
        for movie in candidates {
            let mut ratings = Vec::with_capacity(members.len());
            for member in members {
                let rating = if store.has_user_rated_movie(member.user_id, movie) {
                    store.rating(member.user_id, movie)?
                } else {
                    self.recommender.predict(member.user_id, movie, &member.neighbors)?
                };
                ratings.push(rating);
            }
            rows.push((movie, ratings));
        }

        Ok(AggregationTable {
            members: members.iter().map(|m| m.user_id).collect(),
            rows,
        })
    }
}

/// Member order used throughout aggregation
pub(crate) fn group_order(group: &[UserId]) -> RecResult<Vec<UserId>> {
    let mut seen = HashSet::new();
    let members: Vec<UserId> = group.iter().copied().filter(|u| seen.insert(*u)).collect();
    if members.is_empty() {
        return Err(RecommendError::EmptyGroup);
    }
    Ok(members)
}

/// Share of each member's own best value delivered by `group_list`
///
/// For member `i`: the sum of row position `i` over the group list's movies,
/// divided by the sum of the member's individual predicted ratings. A zero
/// individual sum cannot yield a ratio and is reported as an error.
pub fn satisfactions(
    table: &AggregationTable,
    members: &[MemberRecommendations],
    group_list: &[ScoredMovie],
) -> RecResult<Vec<Satisfaction>> {
    let group_movies: HashSet<MovieId> = group_list.iter().map(|m| m.movie_id).collect();

    table
        .members()
        .iter()
        .enumerate()
        .map(|(index, user_id)| {
            let individual_value = members
                .iter()
                .find(|m| m.user_id == *user_id)
                .map(MemberRecommendations::individual_value)
                .unwrap_or(0.0);
            if individual_value == 0.0 {
                return Err(RecommendError::ZeroSatisfactionBaseline { user: *user_id });
            }

            let group_value: f64 = table
                .rows()
                .iter()
                .filter(|(movie, _)| group_movies.contains(movie))
                .map(|(_, ratings)| ratings[index])
                .sum();

            Ok(Satisfaction {
                user_id: *user_id,
                score: group_value / individual_value,
            })
        })
        .collect()
}
