// Clustering quality scores: purity against the fraud labels, a sampled
// silhouette coefficient and the Calinski-Harabasz index.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{AnalysisError, Result};

/// Purity of `assignment` with respect to the true `labels`.
///
/// Builds the label x cluster contingency table, takes the largest label count
/// in each cluster and divides their sum by the number of rows.
pub fn purity_score(labels: &Array1<i64>, assignment: &Array1<usize>) -> f64 {
    let total = labels.len();
    if total == 0 {
        return 0.0;
    }

    let mut contingency: HashMap<usize, HashMap<i64, usize>> = HashMap::new();
    for (&label, &cluster) in labels.iter().zip(assignment.iter()) {
        *contingency.entry(cluster).or_default().entry(label).or_insert(0) += 1;
    }

    let majority: usize = contingency
        .values()
        .map(|counts| counts.values().copied().max().unwrap_or(0))
        .sum();

    majority as f64 / total as f64
}

fn check_label_count(n_labels: usize, n_samples: usize) -> Result<()> {
    if n_labels < 2 || n_labels > n_samples.saturating_sub(1) {
        return Err(AnalysisError::MetricComputation(format!(
            "number of distinct clusters is {n_labels}; valid values are 2 to n_samples - 1 (n_samples = {n_samples})"
        )));
    }
    Ok(())
}

fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Mean silhouette coefficient over at most `sample_size` rows.
///
/// When the data has more rows than `sample_size`, a subset is drawn without
/// replacement from an RNG seeded with `seed`, so the score is reproducible.
pub fn silhouette_score(
    features: &Array2<f64>,
    assignment: &Array1<usize>,
    sample_size: usize,
    seed: u64,
) -> Result<f64> {
    let n_rows = features.nrows();
    let rows: Vec<usize> = if n_rows > sample_size {
        let mut rng = StdRng::seed_from_u64(seed);
        rand::seq::index::sample(&mut rng, n_rows, sample_size).into_vec()
    } else {
        (0..n_rows).collect()
    };

    let n_samples = rows.len();
    let mut cluster_sizes: BTreeMap<usize, usize> = BTreeMap::new();
    for &row in &rows {
        *cluster_sizes.entry(assignment[row]).or_insert(0) += 1;
    }
    check_label_count(cluster_sizes.len(), n_samples)?;

    // dense slot per realised cluster id
    let slots: HashMap<usize, usize> = cluster_sizes
        .keys()
        .enumerate()
        .map(|(slot, &cluster)| (cluster, slot))
        .collect();
    let sizes: Vec<usize> = cluster_sizes.values().copied().collect();

    // distance_sums[p][slot]: summed distance from sample p to every sample in cluster slot
    let n_slots = sizes.len();
    let sample_slots: Vec<usize> = rows.iter().map(|&row| slots[&assignment[row]]).collect();
    let mut distance_sums = Array2::<f64>::zeros((n_samples, n_slots));
    for p in 0..n_samples {
        let point = features.row(rows[p]);
        for q in (p + 1)..n_samples {
            let d = euclidean_distance(&point, &features.row(rows[q]));
            distance_sums[[p, sample_slots[q]]] += d;
            distance_sums[[q, sample_slots[p]]] += d;
        }
    }

    let mut total = 0.0;
    for (p, &own) in sample_slots.iter().enumerate() {
        if sizes[own] <= 1 {
            continue;
        }
        let sums = distance_sums.row(p);
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_slots)
            .filter(|&slot| slot != own)
            .map(|slot| sums[slot] / sizes[slot] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }

    Ok(total / n_samples as f64)
}

/// Calinski-Harabasz index: between-cluster over within-cluster dispersion,
/// each scaled by its degrees of freedom.
pub fn calinski_harabasz_score(features: &Array2<f64>, assignment: &Array1<usize>) -> Result<f64> {
    let n_samples = features.nrows();
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &cluster) in assignment.iter().enumerate() {
        members.entry(cluster).or_default().push(row);
    }
    let n_labels = members.len();
    check_label_count(n_labels, n_samples)?;

    let mean = features
        .mean_axis(Axis(0))
        .ok_or_else(|| AnalysisError::MetricComputation("empty feature matrix".to_string()))?;

    let mut extra_disp = 0.0;
    let mut intra_disp = 0.0;
    for rows in members.values() {
        let cluster = features.select(Axis(0), rows);
        let centroid = match cluster.mean_axis(Axis(0)) {
            Some(c) => c,
            None => continue,
        };
        extra_disp += rows.len() as f64 * (&centroid - &mean).mapv(|v| v * v).sum();
        intra_disp += (&cluster - &centroid).mapv(|v| v * v).sum();
    }

    if intra_disp == 0.0 {
        return Ok(1.0);
    }
    Ok(extra_disp * (n_samples - n_labels) as f64 / (intra_disp * (n_labels - 1) as f64))
}

/// Rounds to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
