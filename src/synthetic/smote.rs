//! SMOTE oversampling

use crate::error::{SeverityError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::debug;

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Every class is brought up to the majority count. A synthetic row lies on
/// the segment between a random class member and one of its k nearest
/// same-class neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    seed: u64,
    /// Target samples per class
    target_counts: Option<BTreeMap<usize, usize>>,
}

impl SMOTE {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Euclidean distance
    fn distance(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// k nearest neighbours of `data[of]` among the other rows, O(n log k).
    /// Self is excluded by index, so duplicate points still count as neighbours.
    fn find_neighbors(of: usize, data: &[Vec<f64>], k: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
        let point = &data[of];

        for (i, d) in data.iter().enumerate() {
            if i == of {
                continue;
            }
            let entry = DistIdx(Self::distance(point, d), i);
            if heap.len() < k {
                heap.push(entry);
            } else if let Some(top) = heap.peek() {
                if entry < *top {
                    heap.pop();
                    heap.push(entry);
                }
            }
        }

        let mut neighbors: Vec<usize> = heap.into_iter().map(|DistIdx(_, i)| i).collect();
        neighbors.sort_unstable();
        neighbors
    }

    /// Generate synthetic sample between two points
    fn generate_sample(point: &[f64], neighbor: &[f64], rng: &mut StdRng) -> Vec<f64> {
        let gap: f64 = rng.gen();
        point
            .iter()
            .zip(neighbor.iter())
            .map(|(&p, &n)| p + gap * (n - p))
            .collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let counts = class_counts(y);
        let Some(&max_count) = counts.values().max() else {
            return Err(SeverityError::DegenerateData("cannot balance an empty partition".to_string()));
        };

        self.target_counts = Some(counts.keys().map(|&class| (class, max_count)).collect());
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or(SeverityError::ModelNotFitted)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic_x: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<usize> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        // BTreeMap iteration keeps classes in ascending order
        for (&class, &target_count) in targets {
            let class_idx = indices.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            let n_to_generate = target_count.saturating_sub(class_idx.len());
            n_synthetic.insert(class, n_to_generate);

            if n_to_generate == 0 || class_idx.is_empty() {
                continue;
            }

            let class_samples: Vec<Vec<f64>> = class_idx.iter().map(|&i| x.row(i).to_vec()).collect();

            if class_samples.len() == 1 {
                debug!(class, n_to_generate, "Single-sample class, oversampling by duplication");
                for _ in 0..n_to_generate {
                    synthetic_x.extend_from_slice(&class_samples[0]);
                    synthetic_y.push(class);
                }
                continue;
            }

            let k = self.k_neighbors.min(class_samples.len() - 1);
            let neighbors: Vec<Vec<usize>> = (0..class_samples.len())
                .map(|i| Self::find_neighbors(i, &class_samples, k))
                .collect();

            for _ in 0..n_to_generate {
                let idx = rng.gen_range(0..class_samples.len());
                let candidates = &neighbors[idx];
                let neighbor_idx = candidates[rng.gen_range(0..candidates.len())];

                let sample = Self::generate_sample(&class_samples[idx], &class_samples[neighbor_idx], &mut rng);
                synthetic_x.extend(sample);
                synthetic_y.push(class);
            }
        }

        let synthetic = Array2::from_shape_vec((synthetic_y.len(), n_features), synthetic_x)?;
        let result_x = ndarray::concatenate(Axis(0), &[x.view(), synthetic.view()])?;

        let mut all_y: Vec<usize> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}
