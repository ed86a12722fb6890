//! K-Nearest Neighbors classifier

use super::decision_tree::argmax;
use crate::error::{SeverityError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<usize>>,
    n_classes: usize,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
            n_classes: 0,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    /// Fit the classifier (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<&mut Self> {
        if self.config.n_neighbors == 0 {
            return Err(SeverityError::invalid_parameter("n_neighbors", 0, "must be positive"));
        }
        if x.nrows() != y.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() < self.config.n_neighbors {
            return Err(SeverityError::invalid_parameter(
                "n_neighbors",
                self.config.n_neighbors,
                format!("exceeds the {} training samples", x.nrows()),
            ));
        }

        self.x_train = Some(x.as_standard_layout().to_owned());
        self.y_train = Some(y.clone());
        self.n_classes = n_classes;
        Ok(self)
    }

    /// Predict class probabilities (parallelized over query rows)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(x_train), Some(y_train)) = (&self.x_train, &self.y_train) else {
            return Err(SeverityError::ModelNotFitted);
        };
        if x.ncols() != x_train.ncols() {
            return Err(SeverityError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let k = self.config.n_neighbors;
        let metric = self.config.metric;
        let weights = self.config.weights;
        let n_classes = self.n_classes;

        let probs: Vec<Vec<f64>> = x
            .outer_iter()
            .into_par_iter()
            .map(|row| {
                let point = row.to_vec();
                let neighbors = find_k_nearest(&point, x_train, y_train, k, metric);
                class_probs_from(&neighbors, n_classes, weights)
            })
            .collect();

        let flat: Vec<f64> = probs.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(&row.to_vec())).collect())
    }
}

/// Max-heap entry for partial sort (keeps k smallest distances).
/// Ties on distance order by training index so results are deterministic.
#[derive(PartialEq)]
struct DistLabel(f64, usize, usize);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: &[f64],
    x_train: &Array2<f64>,
    y_train: &Array1<usize>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, usize)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.outer_iter().enumerate() {
        let dist = match row.as_slice() {
            Some(slice) => compute_distance(point, slice, metric),
            None => compute_distance(point, &row.to_vec(), metric),
        };
        let entry = DistLabel(dist, i, y_train[i]);
        if heap.len() < k {
            heap.push(entry);
        } else if let Some(top) = heap.peek() {
            if entry < *top {
                heap.pop();
                heap.push(entry);
            }
        }
    }

    heap.into_iter().map(|dl| (dl.0, dl.2)).collect()
}

/// Compute distance between two points using the specified metric
fn compute_distance(a: &[f64], b: &[f64], metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| {
                let d = ai - bi;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
    }
}

/// Class probabilities from weighted neighbor votes.
/// With distance weighting, exact matches take all the weight.
fn class_probs_from(neighbors: &[(f64, usize)], n_classes: usize, weights: WeightScheme) -> Vec<f64> {
    let mut votes = vec![0.0; n_classes];
    let exact: Vec<usize> = neighbors
        .iter()
        .filter(|(d, _)| *d == 0.0)
        .map(|&(_, c)| c)
        .collect();

    if weights == WeightScheme::Distance && !exact.is_empty() {
        for c in exact {
            votes[c] += 1.0;
        }
    } else {
        for &(dist, label) in neighbors {
            votes[label] += match weights {
                WeightScheme::Uniform => 1.0,
                WeightScheme::Distance => 1.0 / dist,
            };
        }
    }

    let total: f64 = votes.iter().sum();
    if total > 0.0 {
        votes.iter_mut().for_each(|v| *v /= total);
    }
    votes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_classification_data() -> (Array2<f64>, Array1<usize>) {
        let x = Array2::from_shape_vec((20, 2), vec![
            // Class 0 (low values)
            1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 2.5, 2.5, 1.0, 2.0,
            1.5, 2.5, 2.0, 1.5, 2.5, 1.0, 1.2, 1.8, 1.8, 1.2,
            // Class 1 (high values)
            8.0, 8.0, 8.5, 8.5, 9.0, 9.0, 9.5, 9.5, 8.0, 9.0,
            8.5, 9.5, 9.0, 8.5, 9.5, 8.0, 8.2, 8.8, 8.8, 8.2,
        ]).unwrap();

        let y = Array1::from_vec((0..20).map(|i| if i < 10 { 0 } else { 1 }).collect());
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y, 2).unwrap();

        let predictions = knn.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_distance_metrics() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((compute_distance(&a, &b, DistanceMetric::Euclidean) - 5.0).abs() < 1e-12);
        assert!((compute_distance(&a, &b, DistanceMetric::Manhattan) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_knn_exact_match() {
        let (x, y) = create_classification_data();

        let mut knn = KNNClassifier::new(KNNConfig {
            n_neighbors: 5,
            weights: WeightScheme::Distance,
            ..Default::default()
        });
        knn.fit(&x, &y, 2).unwrap();

        let proba = knn.predict_proba(&x).unwrap();
        assert_eq!(proba[[0, 0]], 1.0);
        assert_eq!(proba[[19, 1]], 1.0);
    }

    #[test]
    fn test_not_fitted_is_error() {
        let knn = KNNClassifier::with_k(3);
        assert!(matches!(
            knn.predict(&Array2::zeros((1, 2))),
            Err(SeverityError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let mut knn = KNNClassifier::with_k(30);
        let (x, y) = create_classification_data();
        assert!(knn.fit(&x, &y, 2).is_err());
    }
}
