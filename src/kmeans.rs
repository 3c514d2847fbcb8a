use std::path::{Path, PathBuf};
use std::time::Instant;

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::csv_reader::{load_dataset, Dataset};
use crate::error::{AnalysisError, Result};
use crate::metrics::{calinski_harabasz_score, purity_score, round_to, silhouette_score};

/// Seed for k-means initialisation and silhouette sampling.
pub const RANDOM_SEED: u64 = 42;
/// Independent k-means++ restarts; the lowest-inertia run wins.
pub const N_INIT: usize = 10;
pub const MAX_ITERATIONS: u64 = 300;
pub const TOLERANCE: f64 = 1e-4;
/// Rows drawn for the silhouette score.
pub const SILHOUETTE_SAMPLE_SIZE: usize = 10_000;
/// A cluster is high risk above this fraud percentage.
pub const HIGH_RISK_THRESHOLD: f64 = 50.0;
/// Label value marking a fraudulent transaction.
pub const FRAUD_LABEL: i64 = 1;

/// Fraud breakdown for one cluster id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterReport {
    pub cluster_id: usize,
    pub total_samples: usize,
    pub fraud_samples: usize,
    pub fraud_percentage: f64,
    pub is_high_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub purity_score: f64,
    pub silhouette_score: f64,
    pub calinski_harabasz: f64,
}

/// Response body of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub n_clusters_used: usize,
    pub metrics: QualityMetrics,
    pub clusters_analysis: Vec<ClusterReport>,
}

/// Fits k-means on the feature matrix and returns one cluster id per row.
pub fn fit_clusters(features: &Array2<f64>, n_clusters: usize) -> Result<Array1<usize>> {
    let n_rows = features.nrows();
    if n_clusters < 1 {
        return Err(AnalysisError::InvalidParameter {
            name: "n_clusters",
            message: "must be at least 1".to_string(),
        });
    }
    if n_clusters > n_rows {
        return Err(AnalysisError::InvalidParameter {
            name: "n_clusters",
            message: format!("requested {n_clusters} clusters but the dataset has only {n_rows} rows"),
        });
    }

    let dataset = DatasetBase::from(features.view());
    let rng = StdRng::seed_from_u64(RANDOM_SEED);
    let model = KMeans::params_with_rng(n_clusters, rng)
        .n_runs(N_INIT)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)?;

    let assignment: Array1<usize> = model.predict(features);
    Ok(relabel_by_first_row(&assignment, n_clusters))
}

/// Renumbers cluster ids in order of the first row that lands in each cluster.
/// Clusters no row landed in take the remaining ids, keeping their relative order.
pub fn relabel_by_first_row(assignment: &Array1<usize>, n_clusters: usize) -> Array1<usize> {
    let mut mapping: Vec<Option<usize>> = vec![None; n_clusters];
    let mut next = 0;
    for &cluster in assignment.iter() {
        if mapping[cluster].is_none() {
            mapping[cluster] = Some(next);
            next += 1;
        }
    }
    for slot in mapping.iter_mut().filter(|slot| slot.is_none()) {
        *slot = Some(next);
        next += 1;
    }

    assignment.mapv(|cluster| mapping[cluster].unwrap_or(cluster))
}

/// One report per cluster id in `0..n_clusters`, including ids no row landed in.
pub fn build_cluster_reports(
    assignment: &Array1<usize>,
    labels: &Array1<i64>,
    n_clusters: usize,
) -> Vec<ClusterReport> {
    let mut totals = vec![0usize; n_clusters];
    let mut frauds = vec![0usize; n_clusters];
    for (&cluster, &label) in assignment.iter().zip(labels.iter()) {
        if cluster < n_clusters {
            totals[cluster] += 1;
            if label == FRAUD_LABEL {
                frauds[cluster] += 1;
            }
        }
    }

    (0..n_clusters)
        .map(|cluster_id| {
            let total_samples = totals[cluster_id];
            let fraud_samples = frauds[cluster_id];
            let fraud_percentage = if total_samples > 0 {
                round_to(fraud_samples as f64 / total_samples as f64 * 100.0, 4)
            } else {
                0.0
            };
            ClusterReport {
                cluster_id,
                total_samples,
                fraud_samples,
                fraud_percentage,
                is_high_risk: fraud_percentage > HIGH_RISK_THRESHOLD,
            }
        })
        .collect()
}

/// Purity, sampled silhouette and Calinski-Harabasz for a fitted assignment.
pub fn compute_metrics(dataset: &Dataset, assignment: &Array1<usize>) -> Result<QualityMetrics> {
    let purity = purity_score(&dataset.labels, assignment);
    let silhouette = silhouette_score(
        &dataset.features,
        assignment,
        SILHOUETTE_SAMPLE_SIZE,
        RANDOM_SEED,
    )?;
    let calinski = calinski_harabasz_score(&dataset.features, assignment)?;

    Ok(QualityMetrics {
        purity_score: round_to(purity, 4),
        silhouette_score: round_to(silhouette, 4),
        calinski_harabasz: round_to(calinski, 2),
    })
}

/// Runs the full load, validate, fit, summarise pipeline against one archive.
#[derive(Debug, Clone)]
pub struct ClusterAnalyzer {
    archive_path: PathBuf,
}

impl ClusterAnalyzer {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        ClusterAnalyzer {
            archive_path: archive_path.into(),
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn run(&self, n_clusters: usize) -> Result<AnalysisResult> {
        let started = Instant::now();
        let dataset = load_dataset(&self.archive_path)?;
        debug!(rows = dataset.n_rows(), "dataset loaded");

        analyze(&dataset, n_clusters).map(|result| {
            info!(
                n_clusters,
                rows = dataset.n_rows(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "analysis finished"
            );
            result
        })
    }
}

/// Clusters an already loaded dataset and builds the report.
pub fn analyze(dataset: &Dataset, n_clusters: usize) -> Result<AnalysisResult> {
    if dataset.n_rows() == 0 {
        return Err(AnalysisError::EmptyDataset);
    }

    let assignment = fit_clusters(&dataset.features, n_clusters)?;
    debug!(n_clusters, "k-means fit complete");

    let clusters_analysis = build_cluster_reports(&assignment, &dataset.labels, n_clusters);
    let metrics = compute_metrics(dataset, &assignment)?;

    Ok(AnalysisResult {
        n_clusters_used: n_clusters,
        metrics,
        clusters_analysis,
    })
}
