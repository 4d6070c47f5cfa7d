//! Collaborative-filtering movie recommendation for individuals and groups
//!
//! Ratings live behind [`store::RatingsStore`]; [`services`] holds user-user
//! similarity, prediction, group aggregation, sequential group rounds and the
//! offline evaluation sweep.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{RecResult, RecommendError};
