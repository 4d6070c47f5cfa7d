use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{RecResult, RecommendError},
    models::{Rating, SimilarityMetric},
    services::Recommender,
    store::{InMemoryRatings, SimilarityCache},
};

use super::{evaluate_cell, CellScore, ErrorAccumulator, KFold};

/// What an evaluation sweep covers and how it runs
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    /// Metric names; an unknown name fails the sweep before any work starts
    pub metrics: Vec<String>,
    pub neighbor_sizes: Vec<usize>,
    pub clamp_predictions: bool,
    /// Metric tasks allowed to run at once
    pub max_workers: usize,
    /// Longest wait for the next cell result
    pub cell_timeout: Duration,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SweepPlan {
    fn from(config: &Config) -> Self {
        Self {
            metrics: config.metrics.clone(),
            neighbor_sizes: config.neighbor_sizes(),
            clamp_predictions: config.clamp_predictions,
            max_workers: config.max_workers,
            cell_timeout: Duration::from_secs(config.cell_timeout_secs),
        }
    }
}

/// Scores for one metric, one cell per neighbor size in plan order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: SimilarityMetric,
    pub cells: Vec<CellScore>,
}

/// Outcome of a sweep, series in requested metric order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub series: Vec<MetricSeries>,
}

impl SweepReport {
    pub fn series_for(&self, metric: SimilarityMetric) -> Option<&MetricSeries> {
        self.series.iter().find(|s| s.metric == metric)
    }

    /// Metric name -> (MAE, RMSE) per neighbor size
    pub fn error_table(&self) -> BTreeMap<String, Vec<(f64, f64)>> {
        self.series
            .iter()
            .map(|s| {
                let pairs = s.cells.iter().map(|c| (c.mae, c.rmse)).collect();
                (s.metric.to_string(), pairs)
            })
            .collect()
    }

    /// Lowest-RMSE cell over all metrics, ignoring empty cells
    pub fn best_by_rmse(&self) -> Option<(SimilarityMetric, CellScore)> {
        self.series
            .iter()
            .flat_map(|s| s.cells.iter().map(move |c| (s.metric, *c)))
            .filter(|(_, cell)| !cell.is_empty())
            .min_by(|a, b| {
                a.1.rmse
                    .partial_cmp(&b.1.rmse)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Message from a metric task to the collector
struct CellMessage {
    metric_index: usize,
    size_index: usize,
    result: RecResult<CellScore>,
}

/// Evaluates every (metric, neighbor size) cell of `plan` concurrently
///
/// One blocking task per metric walks the neighbor sizes with its own
/// similarity cache; a semaphore bounds how many run at once. Tasks report
/// each finished cell over a channel and this function, the only writer,
/// assembles the report. Training and test data are shared read-only.
pub async fn run_sweep(
    train: Arc<InMemoryRatings>,
    test: Arc<InMemoryRatings>,
    plan: &SweepPlan,
) -> RecResult<SweepReport> {
    let metrics = dedup_metrics(SimilarityMetric::parse_all(&plan.metrics)?);
    if plan.max_workers == 0 {
        return Err(RecommendError::InvalidInput(
            "max_workers must be positive".to_string(),
        ));
    }

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("sweep", run_id = %run_id);

    execute_sweep(run_id, metrics, train, test, plan)
        .instrument(span)
        .await
}

async fn execute_sweep(
    run_id: Uuid,
    metrics: Vec<SimilarityMetric>,
    train: Arc<InMemoryRatings>,
    test: Arc<InMemoryRatings>,
    plan: &SweepPlan,
) -> RecResult<SweepReport> {
    let start = Instant::now();
    tracing::info!(
        metrics = metrics.len(),
        neighbor_sizes = plan.neighbor_sizes.len(),
        train_ratings = train.len(),
        test_ratings = test.len(),
        "Starting evaluation sweep"
    );

    let semaphore = Arc::new(Semaphore::new(plan.max_workers));
    let (tx, mut rx) = mpsc::unbounded_channel::<CellMessage>();

    for (metric_index, metric) in metrics.iter().copied().enumerate() {
        let tx = tx.clone();
        let train = Arc::clone(&train);
        let test = Arc::clone(&test);
        let semaphore = Arc::clone(&semaphore);
        let sizes = plan.neighbor_sizes.clone();
        let clamp = plan.clamp_predictions;
        let task_span = tracing::Span::current();

        tokio::spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return;
            };

            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let _entered = task_span.enter();
                let cache = SimilarityCache::new();
                let recommender = Recommender::new(&*train).with_cache(&cache);

                for (size_index, neighbor_size) in sizes.into_iter().enumerate() {
                    let result =
                        evaluate_cell(&recommender, &test, metric, neighbor_size, clamp);
                    let message = CellMessage {
                        metric_index,
                        size_index,
                        result,
                    };
                    if tx.send(message).is_err() {
                        break;
                    }
                }

                let (hits, misses) = cache.stats();
                tracing::debug!(%metric, hits, misses, "Metric task finished");
            });

            if let Err(e) = task.await {
                tracing::error!(error = %e, %metric, "Evaluation task join error");
            }
        });
    }
    drop(tx);

    let mut cells: Vec<Vec<Option<CellScore>>> =
        vec![vec![None; plan.neighbor_sizes.len()]; metrics.len()];
    let expected = metrics.len() * plan.neighbor_sizes.len();
    let mut received = 0;

    while received < expected {
        match tokio::time::timeout(plan.cell_timeout, rx.recv()).await {
            Ok(Some(message)) => {
                let score = message.result?;
                cells[message.metric_index][message.size_index] = Some(score);
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                let pending = pending_metrics(&metrics, &cells);
                tracing::error!(
                    pending = %pending,
                    waited_secs = plan.cell_timeout.as_secs(),
                    "Evaluation cell timed out"
                );
                return Err(RecommendError::CellTimeout {
                    metric: pending,
                    waited_secs: plan.cell_timeout.as_secs(),
                });
            }
        }
    }

    if received < expected {
        return Err(RecommendError::Internal(format!(
            "evaluation tasks stopped after {} of {} cells",
            received, expected
        )));
    }

    let series = metrics
        .iter()
        .zip(cells)
        .map(|(metric, row)| MetricSeries {
            metric: *metric,
            cells: row.into_iter().flatten().collect(),
        })
        .collect();

    tracing::info!(
        cells = expected,
        processing_time_ms = start.elapsed().as_millis(),
        "Evaluation sweep completed"
    );

    Ok(SweepReport {
        run_id,
        completed_at: Utc::now(),
        series,
    })
}

/// K-fold cross-validation of the sweep
///
/// Fold i is the test set once, the other folds form the training set.
/// Per-cell errors are pooled across folds by sample count.
pub async fn cross_validate(
    ratings: &[Rating],
    kfold: &KFold,
    plan: &SweepPlan,
) -> RecResult<SweepReport> {
    let folds = kfold.split(ratings)?;
    let mut reports = Vec::with_capacity(folds.len());

    for (test_index, test_fold) in folds.iter().enumerate() {
        let train: Vec<Rating> = folds
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != test_index)
            .flat_map(|(_, fold)| fold.iter().cloned())
            .collect();

        tracing::info!(
            fold = test_index,
            folds = folds.len(),
            train = train.len(),
            test = test_fold.len(),
            "Evaluating fold"
        );

        let report = run_sweep(
            Arc::new(InMemoryRatings::from_ratings(train)),
            Arc::new(InMemoryRatings::from_ratings(test_fold.clone())),
            plan,
        )
        .await?;
        reports.push(report);
    }

    Ok(pool_reports(&reports))
}

fn pool_reports(reports: &[SweepReport]) -> SweepReport {
    let mut pooled: Vec<MetricSeries> = Vec::new();

    if let Some(first) = reports.first() {
        for (series_index, series) in first.series.iter().enumerate() {
            let cells = series
                .cells
                .iter()
                .enumerate()
                .map(|(cell_index, cell)| {
                    let mut errors = ErrorAccumulator::default();
                    for report in reports {
                        errors.merge_cell(&report.series[series_index].cells[cell_index]);
                    }
                    errors.finish(cell.neighbor_size)
                })
                .collect();
            pooled.push(MetricSeries {
                metric: series.metric,
                cells,
            });
        }
    }

    SweepReport {
        run_id: Uuid::new_v4(),
        completed_at: Utc::now(),
        series: pooled,
    }
}

fn dedup_metrics(metrics: Vec<SimilarityMetric>) -> Vec<SimilarityMetric> {
    let mut unique = Vec::with_capacity(metrics.len());
    for metric in metrics {
        if !unique.contains(&metric) {
            unique.push(metric);
        }
    }
    unique
}

fn pending_metrics(metrics: &[SimilarityMetric], cells: &[Vec<Option<CellScore>>]) -> String {
    metrics
        .iter()
        .zip(cells)
        .filter(|(_, row)| row.iter().any(Option::is_none))
        .map(|(metric, _)| metric.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::evaluation::TrainTestSplit;

    fn create_ratings() -> Vec<Rating> {
        let mut ratings = Vec::new();
        for user in 1..=8u32 {
            for movie in 1..=12u32 {
                if (user * movie) % 4 == 1 {
                    continue;
                }
                let rating = ((user + movie * 2) % 5 + 1) as f64;
                ratings.push(Rating::new(user, movie, rating));
            }
        }
        ratings
    }

    fn plan(metrics: &[&str], sizes: Vec<usize>) -> SweepPlan {
        SweepPlan {
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            neighbor_sizes: sizes,
            clamp_predictions: true,
            max_workers: 2,
            cell_timeout: Duration::from_secs(30),
        }
    }

    fn stores() -> (Arc<InMemoryRatings>, Arc<InMemoryRatings>) {
        let (train, test) = TrainTestSplit::new(0.75)
            .with_random_state(3)
            .split(&create_ratings());
        (
            Arc::new(InMemoryRatings::from_ratings(train)),
            Arc::new(InMemoryRatings::from_ratings(test)),
        )
    }

    #[tokio::test]
    async fn test_sweep_covers_every_cell_in_order() {
        let (train, test) = stores();
        let plan = plan(&["jaccard", "pcc", "wpcc_coverage"], vec![1, 3, 5]);

        let report = run_sweep(train, test, &plan).await.unwrap();

        let metrics: Vec<SimilarityMetric> = report.series.iter().map(|s| s.metric).collect();
        assert_eq!(
            metrics,
            vec![
                SimilarityMetric::Jaccard,
                SimilarityMetric::Pcc,
                SimilarityMetric::WeightedPccCoverage
            ]
        );
        for series in &report.series {
            let sizes: Vec<usize> = series.cells.iter().map(|c| c.neighbor_size).collect();
            assert_eq!(sizes, vec![1, 3, 5]);
            assert!(series.cells.iter().all(|c| c.samples > 0));
            assert!(series.cells.iter().all(|c| c.rmse >= c.mae));
        }
        assert_eq!(report.error_table()["pcc"].len(), 3);
    }

    #[tokio::test]
    async fn test_sweep_matches_sequential_evaluation() {
        let (train, test) = stores();
        let plan = plan(&["wpcc_jaccard"], vec![2, 4]);

        let report = run_sweep(Arc::clone(&train), Arc::clone(&test), &plan)
            .await
            .unwrap();

        let recommender = Recommender::new(&*train);
        for cell in &report.series[0].cells {
            let expected = evaluate_cell(
                &recommender,
                &test,
                SimilarityMetric::WeightedPccJaccard,
                cell.neighbor_size,
                true,
            )
            .unwrap();
            assert_eq!(*cell, expected);
        }
    }

    #[tokio::test]
    async fn test_unknown_metric_fails_before_work() {
        let (train, test) = stores();
        let plan = plan(&["pcc", "euclidean"], vec![1]);

        let err = run_sweep(train, test, &plan).await.unwrap_err();
        assert!(matches!(err, RecommendError::UnknownMetric(name) if name == "euclidean"));
    }

    #[tokio::test]
    async fn test_duplicate_metrics_are_evaluated_once() {
        let (train, test) = stores();
        let plan = plan(&["pcc", "PCC"], vec![2]);

        let report = run_sweep(train, test, &plan).await.unwrap();
        assert_eq!(report.series.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_sample_cells_are_reported_as_empty() {
        let train = Arc::new(InMemoryRatings::from_ratings(vec![Rating::new(1, 1, 3.0)]));
        let test = Arc::new(InMemoryRatings::from_ratings(vec![Rating::new(2, 1, 4.0)]));
        let plan = plan(&["pcc"], vec![1, 2]);

        let report = run_sweep(train, test, &plan).await.unwrap();
        assert!(report.series[0].cells.iter().all(CellScore::is_empty));
        assert!(report.best_by_rmse().is_none());
    }

    #[tokio::test]
    async fn test_cross_validation_pools_all_folds() {
        let ratings = create_ratings();
        let plan = plan(&["pcc", "jaccard"], vec![3]);

        let kfold = KFold::new(4).with_random_state(7);
        let report = cross_validate(&ratings, &kfold, &plan).await.unwrap();

        assert_eq!(report.series.len(), 2);
        let cell = report.series[0].cells[0];
        assert!(cell.samples > 0);
        assert!(cell.samples <= ratings.len());
        assert!(report.best_by_rmse().is_some());
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = SweepReport {
            run_id: Uuid::nil(),
            completed_at: Utc::now(),
            series: vec![MetricSeries {
                metric: SimilarityMetric::Pcc,
                cells: vec![CellScore {
                    neighbor_size: 10,
                    mae: 0.75,
                    rmse: 0.9,
                    samples: 12,
                }],
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["series"][0]["metric"], "pcc");
        assert_eq!(json["series"][0]["cells"][0]["samples"], 12);
    }
}
