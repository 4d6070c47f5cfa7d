pub mod evaluation;
mod group;
mod neighbors;
mod prediction;
mod recommendations;
mod sequential;
mod similarity;

pub use group::{
    satisfactions, AggregationStrategy, AggregationTable, GroupOptions, GroupRecommendation,
    GroupRecommender, MemberRecommendations, DISAGREEMENT_EPSILON,
};
pub use prediction::predict;
pub use recommendations::Recommender;
pub use sequential::{rank_by_satisfaction, SequentialRecommender, SequentialRound, SequentialState};
pub use similarity::{jaccard, pcc, wpcc_coverage, wpcc_jaccard};
