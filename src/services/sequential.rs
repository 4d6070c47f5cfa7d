//! Multi-round group recommendation with satisfaction-based reweighting
//!
//! Round 0 ranks with the weighted-average strategy. Every later round ranks
//! each candidate by the sum over members of rating * (1 - satisfaction in the
//! previous round), so members who were under-served gain influence. A movie
//! is never recommended twice within one run.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::instrument;

use crate::{
    config::Config,
    error::{RecResult, RecommendError},
    models::{MovieId, Satisfaction, ScoredMovie, UserId},
    store::RatingsStore,
};

use super::group::{
    satisfactions, AggregationStrategy, AggregationTable, GroupOptions, GroupRecommender,
};
use super::Recommender;

/// State carried from one round to the next
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SequentialState {
    /// Index of the next round to run
    pub round: usize,
    /// Every movie recommended in earlier rounds
    pub already_recommended: BTreeSet<MovieId>,
    /// Satisfactions from the last completed round, in member order
    pub previous_satisfactions: Option<Vec<Satisfaction>>,
}

/// Output of one round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequentialRound {
    pub round: usize,
    pub recommendations: Vec<ScoredMovie>,
    pub satisfactions: Vec<Satisfaction>,
}

/// Runs group recommendation over several rounds for one fixed group
pub struct SequentialRecommender<'a, S: RatingsStore + ?Sized> {
    group: GroupRecommender<'a, S>,
    iterations: usize,
}

impl<'a, S: RatingsStore + ?Sized> SequentialRecommender<'a, S> {
    pub fn new(group: GroupRecommender<'a, S>) -> Self {
        Self {
            group,
            iterations: Config::default().iterations,
        }
    }

    /// Group options and round count taken from `config`
    pub fn from_config(recommender: Recommender<'a, S>, config: &Config) -> Self {
        Self {
            group: GroupRecommender::new(recommender, GroupOptions::from(config)),
            iterations: config.iterations,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Runs the configured number of rounds
    pub fn run_configured(&self, group: &[UserId]) -> RecResult<Vec<SequentialRound>> {
        self.run(group, self.iterations)
    }

    /// Runs up to `iterations` rounds
    ///
    /// Stops early, returning the completed rounds, once some member has no
    /// unrated movie left outside the already-recommended set.
    #[instrument(skip(self))]
    pub fn run(&self, group: &[UserId], iterations: usize) -> RecResult<Vec<SequentialRound>> {
        let mut state = SequentialState::default();
        let mut rounds = Vec::with_capacity(iterations);

        while state.round < iterations {
            match self.next_round(group, state)? {
                Some((round, next_state)) => {
                    rounds.push(round);
                    state = next_state;
                }
                None => break,
            }
        }

        Ok(rounds)
    }

    /// Runs one round from `state`
    ///
    /// Returns `None` when the candidate pool is exhausted.
    pub fn next_round(
        &self,
        group: &[UserId],
        state: SequentialState,
    ) -> RecResult<Option<(SequentialRound, SequentialState)>> {
        let n = self.group.options().n;
        let members = self
            .group
            .member_recommendations(group, &state.already_recommended)?;

        if let Some(starved) = members.iter().find(|m| m.recommendations.is_empty()) {
            tracing::warn!(
                round = state.round,
                user = starved.user_id,
                already_recommended = state.already_recommended.len(),
                "Candidate pool exhausted, ending sequence early"
            );
            return Ok(None);
        }

        let table = self.group.aggregation_table(&members)?;

        let recommendations = match &state.previous_satisfactions {
            None => table.rank(AggregationStrategy::WeightedAverage, n),
            Some(previous) => rank_by_satisfaction(&table, previous, n)?,
        };

        let round_satisfactions = satisfactions(&table, &members, &recommendations)?;

        tracing::info!(
            round = state.round,
            candidates = table.len(),
            recommended = recommendations.len(),
            "Sequential round completed"
        );

        let mut already_recommended = state.already_recommended;
        already_recommended.extend(recommendations.iter().map(|m| m.movie_id));

        let next_state = SequentialState {
            round: state.round + 1,
            already_recommended,
            previous_satisfactions: Some(round_satisfactions.clone()),
        };

        let round = SequentialRound {
            round: state.round,
            recommendations,
            satisfactions: round_satisfactions,
        };

        Ok(Some((round, next_state)))
    }
}

/// Ranks candidates by sum of rating * (1 - previous satisfaction)
///
/// `previous` must list the table's members in the table's order.
pub fn rank_by_satisfaction(
    table: &AggregationTable,
    previous: &[Satisfaction],
    n: usize,
) -> RecResult<Vec<ScoredMovie>> {
    let aligned = previous.len() == table.members().len()
        && previous
            .iter()
            .zip(table.members())
            .all(|(sat, member)| sat.user_id == *member);
    if !aligned {
        return Err(RecommendError::Internal(
            "previous satisfactions do not match group members".to_string(),
        ));
    }

    let weights: Vec<f64> = previous.iter().map(|sat| 1.0 - sat.score).collect();

    Ok(table.rank_by(n, |ratings| {
        ratings
            .iter()
            .zip(&weights)
            .map(|(rating, weight)| rating * weight)
            .sum()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rating, SimilarityMetric};
    use crate::store::InMemoryRatings;

    fn create_store() -> InMemoryRatings {
        // Six users over twenty movies with a deterministic spread of ratings
        let mut ratings = Vec::new();
        for user in 1..=6u32 {
            for movie in 1..=20u32 {
                if (user + movie) % 3 == 0 {
                    continue;
                }
                let rating = ((user * 7 + movie * 3) % 5 + 1) as f64;
                ratings.push(Rating::new(user, movie, rating));
            }
        }
        InMemoryRatings::from_ratings(ratings)
    }

    fn options(n: usize) -> GroupOptions {
        GroupOptions {
            metric: SimilarityMetric::Pcc,
            n,
            neighbor_size: 5,
        }
    }

    #[test]
    fn test_rounds_never_repeat_movies() {
        let store = create_store();
        let group = GroupRecommender::new(Recommender::new(&store), options(2));
        let sequential = SequentialRecommender::new(group);

        let mut state = SequentialState::default();
        let mut seen: BTreeSet<MovieId> = BTreeSet::new();

        for round_index in 0..3 {
            let (round, next) = sequential.next_round(&[1, 2, 3], state).unwrap().unwrap();
            assert_eq!(round.round, round_index);
            assert_eq!(round.satisfactions.len(), 3);

            for movie in &round.recommendations {
                assert!(seen.insert(movie.movie_id), "movie repeated across rounds");
            }
            assert_eq!(next.already_recommended, seen);
            state = next;
        }
    }

    #[test]
    fn test_round_count_follows_config() {
        let store = create_store();
        let config = Config {
            iterations: 2,
            recommendation_count: 2,
            neighbor_size: 5,
            ..Config::default()
        };
        let sequential = SequentialRecommender::from_config(Recommender::new(&store), &config);
        assert_eq!(sequential.iterations(), 2);

        let rounds = sequential.run_configured(&[1, 2, 3]).unwrap();
        assert_eq!(rounds.len(), 2);
        assert!(rounds.iter().all(|r| r.recommendations.len() <= 2));

        let longer = sequential.with_iterations(3).run_configured(&[1, 2, 3]).unwrap();
        assert_eq!(longer.len(), 3);
    }

    #[test]
    fn test_run_stops_when_pool_exhausted() {
        let store = InMemoryRatings::from_ratings(vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 3.0),
            Rating::new(2, 1, 4.0),
            Rating::new(2, 3, 2.0),
            Rating::new(2, 4, 5.0),
            Rating::new(3, 2, 4.0),
            Rating::new(3, 3, 3.0),
            Rating::new(3, 4, 1.0),
        ]);
        let group = GroupRecommender::new(Recommender::new(&store), options(1));
        // User 1 has only movies 3 and 4 left to be recommended
        let rounds = SequentialRecommender::new(group).run(&[1, 2], 10).unwrap();
        assert!(rounds.len() < 10);
        assert!(!rounds.is_empty());
    }

    #[test]
    fn test_rank_by_satisfaction_favors_underserved_member() {
        let t = AggregationTable::new(
            vec![1, 2],
            vec![(10, vec![5.0, 1.0]), (20, vec![1.0, 5.0])],
        )
        .unwrap();
        // Member 1 was fully served, member 2 got nothing
        let previous = [
            Satisfaction { user_id: 1, score: 1.0 },
            Satisfaction { user_id: 2, score: 0.0 },
        ];
        let ranked = rank_by_satisfaction(&t, &previous, 2).unwrap();
        assert_eq!(ranked[0].movie_id, 20);
        assert_eq!(ranked[0].score, 5.0);
        assert_eq!(ranked[1].score, 1.0);
    }

    #[test]
    fn test_rank_by_satisfaction_rejects_misaligned_members() {
        let t = AggregationTable::new(vec![1, 2], vec![(10, vec![5.0, 1.0])]).unwrap();
        let previous = [
            Satisfaction { user_id: 2, score: 0.5 },
            Satisfaction { user_id: 1, score: 0.5 },
        ];
        assert!(rank_by_satisfaction(&t, &previous, 1).is_err());
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let store = create_store();
        let group = GroupRecommender::new(Recommender::new(&store), options(2));
        assert!(matches!(
            SequentialRecommender::new(group).run(&[], 3),
            Err(RecommendError::EmptyGroup)
        ));
    }
}
