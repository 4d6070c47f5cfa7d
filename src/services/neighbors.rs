use std::collections::BTreeMap;

use crate::{
    error::RecResult,
    models::{sort_descending, Neighbor, SimilarityMetric, UserId},
    store::{ensure_user, RatingsStore},
};

use super::Recommender;

impl<'a, S: RatingsStore + ?Sized> Recommender<'a, S> {
    /// The `n` users most similar to `user`, most similar first
    ///
    /// `user` itself is never included. Ties keep the store's user order
    /// (ascending id), which is stable but carries no meaning.
    pub fn top_n_similar_users(
        &self,
        user: UserId,
        metric: SimilarityMetric,
        n: usize,
    ) -> RecResult<Vec<Neighbor>> {
        let mut neighbors = self.ranked_neighbors(user, metric)?;
        neighbors.truncate(n);
        Ok(neighbors)
    }

    /// Every other user ranked by similarity to every user
    pub fn similarity_matrix(
        &self,
        metric: SimilarityMetric,
    ) -> RecResult<BTreeMap<UserId, Vec<Neighbor>>> {
        self.store
            .users()
            .into_iter()
            .map(|user| Ok((user, self.ranked_neighbors(user, metric)?)))
            .collect()
    }

    fn ranked_neighbors(&self, user: UserId, metric: SimilarityMetric) -> RecResult<Vec<Neighbor>> {
        ensure_user(self.store, user)?;

        let mut neighbors = Vec::new();
        for other in self.store.users() {
            if other == user {
                continue;
            }
            neighbors.push(Neighbor {
                user_id: other,
                similarity: self.similarity(metric, user, other)?,
            });
        }

        sort_descending(&mut neighbors, |n| n.similarity);
        Ok(neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;
    use crate::store::InMemoryRatings;

    fn create_store() -> InMemoryRatings {
        let scenario = [
            (1, [5.0, 3.0, 4.0, 2.0]),
            (2, [4.0, 2.0, 5.0, 1.0]),
            (3, [1.0, 5.0, 2.0, 4.0]),
        ];
        let ratings = scenario
            .iter()
            .flat_map(|(user, ratings)| {
                ratings
                    .iter()
                    .enumerate()
                    .map(move |(i, r)| Rating::new(*user, i as u32 + 1, *r))
            })
            .collect();
        InMemoryRatings::from_ratings(ratings)
    }

    #[test]
    fn test_most_similar_user_first() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        let neighbors = recommender
            .top_n_similar_users(1, SimilarityMetric::Pcc, 1)
            .unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].user_id, 2);
    }

    #[test]
    fn test_excludes_self_and_sorts_descending() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        for metric in SimilarityMetric::ALL {
            let neighbors = recommender.top_n_similar_users(1, metric, 10).unwrap();
            assert_eq!(neighbors.len(), 2);
            assert!(neighbors.iter().all(|n| n.user_id != 1));
            assert!(neighbors
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity));
        }
    }

    #[test]
    fn test_ties_keep_user_order() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        // Everyone rated the same movies, so Jaccard is 1.0 for all pairs
        let neighbors = recommender
            .top_n_similar_users(2, SimilarityMetric::Jaccard, 10)
            .unwrap();
        let ids: Vec<UserId> = neighbors.iter().map(|n| n.user_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_single_user_has_no_neighbors() {
        let store = InMemoryRatings::from_ratings(vec![Rating::new(1, 1, 4.0)]);
        let recommender = Recommender::new(&store);
        let neighbors = recommender
            .top_n_similar_users(1, SimilarityMetric::Pcc, 5)
            .unwrap();
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_similarity_matrix_covers_all_pairs() {
        let store = create_store();
        let recommender = Recommender::new(&store);
        let matrix = recommender
            .similarity_matrix(SimilarityMetric::WeightedPccCoverage)
            .unwrap();
        assert_eq!(matrix.len(), 3);
        assert!(matrix.values().all(|row| row.len() == 2));
        assert_eq!(matrix[&3].last().unwrap().user_id, 1);
    }
}
