//! K-Means clustering of employers on their demographic percentages

use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::{Distance, L2Dist};
use ndarray::{Array1, Array2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::config::ClusterParams;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};

/// Fitted clustering of a dataset
#[derive(Debug, Clone)]
pub struct ClusterModel {
    /// Number of clusters
    pub k: usize,
    /// Cluster label per record, covering exactly `0..k`
    pub labels: Array1<usize>,
    /// Cluster centroids in percentage space, row `i` for label `i`
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// Mean silhouette coefficient; `None` when fewer than two clusters exist
    pub silhouette: Option<f64>,
}

impl ClusterModel {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }

    /// Employer id and label for every record
    pub fn assignments<'a>(&'a self, dataset: &'a Dataset) -> impl Iterator<Item = (&'a str, usize)> {
        dataset
            .records()
            .iter()
            .zip(self.labels.iter())
            .map(|(record, &label)| (record.employer_id.as_str(), label))
    }

    /// Mean of every feature per cluster, shape (k, features)
    pub fn cluster_means(&self, dataset: &Dataset) -> Array2<f64> {
        let n_features = dataset.feature_names().len();
        let mut sums = Array2::<f64>::zeros((self.k, n_features));
        for (record, &label) in dataset.records().iter().zip(self.labels.iter()) {
            for (col, value) in record.values.iter().enumerate() {
                sums[[label, col]] += value;
            }
        }
        for (label, size) in self.cluster_sizes().into_iter().enumerate() {
            if size > 0 {
                sums.row_mut(label).mapv_inplace(|sum| sum / size as f64);
            }
        }
        sums
    }
}

/// Fit K-Means on the dataset's feature columns
///
/// Initialisation is k-means++ driven by a generator seeded from
/// `params.seed`, so the same data and seed always give the same labels.
///
/// # Errors
/// * `Config` when `k` is zero
/// * `InsufficientData` when there are fewer rows than clusters, or fewer
///   distinct points than clusters so some cluster ends up empty
pub fn fit_kmeans(dataset: &Dataset, params: &ClusterParams) -> Result<ClusterModel> {
    let k = params.k;
    if k == 0 {
        return Err(PipelineError::Config(
            "number of clusters must be at least 1".to_string(),
        ));
    }
    if dataset.len() < k {
        return Err(PipelineError::InsufficientData(format!(
            "{} rows cannot be split into {} clusters",
            dataset.len(),
            k
        )));
    }

    let features = dataset.feature_matrix();
    let observations = DatasetBase::from(features.clone());
    let rng = Xoshiro256Plus::seed_from_u64(params.seed);

    let model = KMeans::params_with(k, rng, L2Dist)
        .max_n_iterations(params.max_iterations)
        .tolerance(params.tolerance)
        .fit(&observations)
        .map_err(|e| PipelineError::Clustering(e.to_string()))?;

    let raw_labels: Array1<usize> = model.predict(&features);
    let (labels, order) = relabel_by_first_appearance(&raw_labels, k);
    if order.len() < k {
        return Err(PipelineError::InsufficientData(format!(
            "only {} of {} clusters are populated; the data has too few distinct points",
            order.len(),
            k
        )));
    }

    let fitted = model.centroids();
    let mut centroids = Array2::<f64>::zeros((k, features.ncols()));
    for (new_label, &old_label) in order.iter().enumerate() {
        centroids.row_mut(new_label).assign(&fitted.row(old_label));
    }

    let inertia = compute_inertia(&features, &labels, &centroids);
    let silhouette = sampled_silhouette(&features, &labels, params);

    tracing::debug!(k, inertia, ?silhouette, "k-means fitted");

    Ok(ClusterModel {
        k,
        labels,
        centroids,
        inertia,
        silhouette,
    })
}

/// Renumber labels in order of first appearance.
///
/// Returns the new labels and, for each new label, the original one.
fn relabel_by_first_appearance(raw: &Array1<usize>, k: usize) -> (Array1<usize>, Vec<usize>) {
    let slots = k.max(raw.iter().max().map_or(0, |m| m + 1));
    let mut mapping: Vec<Option<usize>> = vec![None; slots];
    let mut order = Vec::with_capacity(k);
    let labels = raw.mapv(|label| {
        *mapping[label].get_or_insert_with(|| {
            order.push(label);
            order.len() - 1
        })
    });
    (labels, order)
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &cluster)| L2Dist.rdistance(features.row(i), centroids.row(cluster)))
        .sum()
}

/// Silhouette over at most `params.silhouette_sample` rows.
///
/// The sample is drawn without replacement from a generator seeded with
/// `params.seed`, so the score is reproducible.
fn sampled_silhouette(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    params: &ClusterParams,
) -> Option<f64> {
    let n_samples = features.nrows();
    match params.silhouette_sample {
        Some(sample_size) if sample_size < n_samples => {
            let mut rng = Xoshiro256Plus::seed_from_u64(params.seed);
            let mut rows = index::sample(&mut rng, n_samples, sample_size).into_vec();
            rows.sort_unstable();
            tracing::debug!(sample_size, n_samples, "silhouette on a row sample");
            let sampled_labels: Vec<usize> = rows.iter().map(|&row| labels[row]).collect();
            silhouette_score(&features.select(Axis(0), &rows), &sampled_labels)
        }
        _ => silhouette_score(features, &labels.to_vec()),
    }
}

/// Mean silhouette coefficient over every point.
///
/// For a point, `a` is its mean distance to the rest of its cluster and `b`
/// the smallest mean distance to another cluster; the coefficient is
/// `(b - a) / max(a, b)`, and 0 for points alone in their cluster.
/// Returns `None` with fewer than two points or fewer than two clusters.
pub fn silhouette_score(features: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let n_samples = features.nrows().min(labels.len());
    if n_samples < 2 {
        return None;
    }

    let n_clusters = labels.iter().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; n_clusters];
    for &label in &labels[..n_samples] {
        sizes[label] += 1;
    }
    if sizes.iter().filter(|&&size| size > 0).count() < 2 {
        return None;
    }

    let mut silhouette_sum = 0.0;
    let mut distance_sums = vec![0.0; n_clusters];

    for i in 0..n_samples {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }

        distance_sums.iter_mut().for_each(|sum| *sum = 0.0);
        let point = features.row(i);
        for j in 0..n_samples {
            if i != j {
                distance_sums[labels[j]] += L2Dist.distance(point, features.row(j));
            }
        }

        let a_i = distance_sums[own] / (sizes[own] - 1) as f64;
        let b_i = (0..n_clusters)
            .filter(|&cluster| cluster != own && sizes[cluster] > 0)
            .map(|cluster| distance_sums[cluster] / sizes[cluster] as f64)
            .fold(f64::INFINITY, f64::min);

        let denominator = a_i.max(b_i);
        if denominator > 0.0 {
            silhouette_sum += (b_i - a_i) / denominator;
        }
    }

    Some(silhouette_sum / n_samples as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;

    fn dataset(points: &[[f64; 2]]) -> Dataset {
        let records = points
            .iter()
            .enumerate()
            .map(|(i, p)| Record {
                employer_id: format!("e{i}"),
                region: None,
                values: p.to_vec(),
                source_row: i,
            })
            .collect();
        Dataset::new(vec!["x".to_string(), "y".to_string()], records).unwrap()
    }

    fn three_blobs() -> Dataset {
        dataset(&[
            [10.0, 10.0],
            [11.0, 10.5],
            [10.5, 11.0],
            [50.0, 50.0],
            [51.0, 50.5],
            [50.5, 51.0],
            [90.0, 10.0],
            [91.0, 10.5],
            [90.5, 11.0],
        ])
    }

    fn params(k: usize, seed: u64) -> ClusterParams {
        ClusterParams {
            k,
            seed,
            ..ClusterParams::default()
        }
    }

    #[test]
    fn test_fit_kmeans() {
        let model = fit_kmeans(&three_blobs(), &params(3, 7)).unwrap();

        assert_eq!(model.k, 3);
        assert_eq!(model.labels.len(), 9);
        assert_eq!(model.centroids.shape(), &[3, 2]);
        assert_eq!(model.cluster_sizes(), vec![3, 3, 3]);
        // Labels are numbered by first appearance
        assert_eq!(model.labels[0], 0);
        assert_eq!(model.labels[3], 1);
        assert_eq!(model.labels[6], 2);
        assert!(model.inertia >= 0.0 && model.inertia.is_finite());

        let silhouette = model.silhouette.unwrap();
        assert!(silhouette > 0.9 && silhouette <= 1.0);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let data = three_blobs();
        let first = fit_kmeans(&data, &params(3, 1234)).unwrap();
        let second = fit_kmeans(&data, &params(3, 1234)).unwrap();
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.centroids, second.centroids);
    }

    #[test]
    fn test_single_cluster_silhouette_is_undefined() {
        let model = fit_kmeans(&three_blobs(), &params(1, 0)).unwrap();
        assert_eq!(model.cluster_sizes(), vec![9]);
        assert!(model.silhouette.is_none());
    }

    #[test]
    fn test_too_few_rows() {
        let data = dataset(&[[1.0, 1.0], [2.0, 2.0]]);
        let err = fit_kmeans(&data, &params(3, 0)).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData(_)));

        let err = fit_kmeans(&data, &params(0, 0)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_cluster_means_and_assignments() {
        let data = three_blobs();
        let model = fit_kmeans(&data, &params(3, 7)).unwrap();

        let means = model.cluster_means(&data);
        assert!((means[[1, 0]] - 50.5).abs() < 1e-9);
        assert!((means[[1, 1]] - 50.5).abs() < 1e-9);

        let assignments: Vec<(&str, usize)> = model.assignments(&data).collect();
        assert_eq!(assignments[4], ("e4", 1));
    }

    #[test]
    fn test_silhouette_known_values() {
        let features =
            Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 10.0, 11.0]).unwrap();
        let score = silhouette_score(&features, &[0, 0, 1, 1]).unwrap();
        // Points 0 and 3: a = 1, b = 10.5; points 1 and 2: a = 1, b = 9.5
        let expected = ((9.5 / 10.5) + (8.5 / 9.5)) / 2.0;
        assert!((score - expected).abs() < 1e-12);

        assert!(silhouette_score(&features, &[0, 0, 0, 0]).is_none());
        // Singletons contribute zero
        let score = silhouette_score(&features, &[0, 0, 0, 1]).unwrap();
        assert!((-1.0..=1.0).contains(&score));
    }

    #[test]
    fn test_silhouette_on_a_row_sample() {
        let data = three_blobs();
        let features = data.feature_matrix();
        let model = fit_kmeans(&data, &params(3, 7)).unwrap();

        let full = ClusterParams {
            silhouette_sample: Some(100),
            ..params(3, 7)
        };
        assert_eq!(
            sampled_silhouette(&features, &model.labels, &full),
            silhouette_score(&features, &model.labels.to_vec())
        );

        let sampled = ClusterParams {
            silhouette_sample: Some(6),
            ..params(3, 7)
        };
        let first = sampled_silhouette(&features, &model.labels, &sampled);
        let second = sampled_silhouette(&features, &model.labels, &sampled);
        assert_eq!(first, second);
        if let Some(score) = first {
            assert!((-1.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_relabel_by_first_appearance() {
        let raw = Array1::from(vec![2, 2, 0, 1, 0]);
        let (labels, order) = relabel_by_first_appearance(&raw, 3);
        assert_eq!(labels.to_vec(), vec![0, 0, 1, 2, 1]);
        assert_eq!(order, vec![2, 0, 1]);
    }
}
