//! Support Vector Machine classifier
//!
//! Kernel SVC trained with SMO (Sequential Minimal Optimization). Multi-class
//! problems use One-vs-Rest; binary problems train a single machine.

use crate::error::{SeverityError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Consecutive passes without an alpha update that count as converged
const STABLE_PASSES: usize = 5;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²).
    /// `None` resolves to 1 / n_features at fit time.
    Rbf { gamma: Option<f64> },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::Rbf { gamma: None }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Kernel function
    pub kernel: KernelType,
    /// Tolerance for the KKT check
    pub tol: f64,
    /// Maximum number of passes over the training set
    pub max_iter: usize,
    /// Training rows above this are stratified-subsampled before building the kernel matrix
    pub max_train_samples: usize,
    /// Random seed
    pub random_state: u64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::default(),
            tol: 1e-3,
            max_iter: 100,
            max_train_samples: 2000,
            random_state: 42,
        }
    }
}

/// A single binary machine (one class vs the rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector
    dual_coef: Array1<f64>,
    bias: f64,
    /// False when the positive class had no training rows
    has_positive: bool,
    converged: bool,
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    /// Resolved RBF gamma (unused for the linear kernel)
    gamma: f64,
    n_features: usize,
    n_classes: usize,
    machines: Vec<BinarySVM>,
    n_train_used: usize,
    is_fitted: bool,
}

impl SVMClassifier {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            gamma: 1.0,
            n_features: 0,
            n_classes: 0,
            machines: Vec::new(),
            n_train_used: 0,
            is_fitted: false,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    /// Number of rows the kernel matrix was built on (after subsampling)
    pub fn n_train_used(&self) -> usize {
        self.n_train_used
    }

    /// Fit the classifier (binary directly, multi-class via One-vs-Rest)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<&mut Self> {
        let c = self.config.c;
        if !(c.is_finite() && c > 0.0) {
            return Err(SeverityError::invalid_parameter("C", c, "must be a positive number"));
        }
        if let KernelType::Rbf { gamma: Some(g) } = self.config.kernel {
            if !(g.is_finite() && g > 0.0) {
                return Err(SeverityError::invalid_parameter("gamma", g, "must be a positive number"));
            }
        }
        if self.config.max_train_samples < 2 {
            return Err(SeverityError::invalid_parameter(
                "max_train_samples",
                self.config.max_train_samples,
                "must be at least 2",
            ));
        }
        if x.nrows() != y.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        let (x, y) = if x.nrows() > self.config.max_train_samples {
            let idx = stratified_subsample(y, self.config.max_train_samples, &mut rng);
            debug!(from = x.nrows(), to = idx.len(), "Subsampling SVM training rows");
            (x.select(Axis(0), &idx), idx.iter().map(|&i| y[i]).collect::<Array1<usize>>())
        } else {
            (x.to_owned(), y.clone())
        };

        let mut present: Vec<usize> = y.to_vec();
        present.sort_unstable();
        present.dedup();
        if present.len() < 2 {
            return Err(SeverityError::TrainingError(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }

        self.n_features = x.ncols();
        self.n_classes = n_classes;
        self.gamma = match self.config.kernel {
            KernelType::Rbf { gamma: Some(g) } => g,
            _ => 1.0 / self.n_features.max(1) as f64,
        };

        let kernel_matrix = self.compute_kernel_matrix(&x);

        // One machine for class 1 in the binary case, one per class otherwise
        let targets: Vec<usize> = if n_classes == 2 { vec![1] } else { (0..n_classes).collect() };
        let seeds: Vec<u64> = targets.iter().map(|_| rng.gen()).collect();

        self.machines = targets
            .par_iter()
            .zip(seeds.par_iter())
            .map(|(&cls, &seed)| {
                let y_binary: Array1<f64> = y.mapv(|v| if v == cls { 1.0 } else { -1.0 });
                let has_positive = y_binary.iter().any(|&v| v > 0.0);
                let (alphas, bias, converged) = self.smo_train(&kernel_matrix, &y_binary, seed);

                let support: Vec<usize> = alphas
                    .iter()
                    .enumerate()
                    .filter(|(_, &a)| a > 1e-8)
                    .map(|(i, _)| i)
                    .collect();

                BinarySVM {
                    support_vectors: x.select(Axis(0), &support),
                    dual_coef: support.iter().map(|&i| alphas[i] * y_binary[i]).collect(),
                    bias,
                    has_positive,
                    converged,
                }
            })
            .collect();

        self.n_train_used = x.nrows();
        self.is_fitted = true;
        Ok(self)
    }

    /// SMO with a cached error vector, updated in O(n) after each pair step.
    /// Returns (alphas, bias, converged).
    fn smo_train(&self, k: &Array2<f64>, y: &Array1<f64>, seed: u64) -> (Array1<f64>, f64, bool) {
        let n = y.len();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        // errors[i] = f(x_i) - y_i with f = sum_k alpha_k y_k K(k, i) + bias
        let mut errors: Array1<f64> = y.mapv(|v| -v);

        let mut passes = 0;
        let mut total_iter = 0;

        while passes < STABLE_PASSES && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = errors[i];
                let kkt_violated = (y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0);
                if !kkt_violated {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = errors[j];

                let alpha_i_old = alphas[i];
                let alpha_j_old = alphas[j];

                let (l, h) = if y[i] != y[j] {
                    ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                } else {
                    ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                let alpha_j_new = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alpha_j_new - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                let alpha_i_new = alpha_i_old + y[i] * y[j] * (alpha_j_old - alpha_j_new);

                let di = y[i] * (alpha_i_new - alpha_i_old);
                let dj = y[j] * (alpha_j_new - alpha_j_old);

                let b1 = bias - e_i - di * k[[i, i]] - dj * k[[i, j]];
                let b2 = bias - e_j - di * k[[i, j]] - dj * k[[j, j]];
                let new_bias = if alpha_i_new > 0.0 && alpha_i_new < c {
                    b1
                } else if alpha_j_new > 0.0 && alpha_j_new < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                let db = new_bias - bias;

                alphas[i] = alpha_i_new;
                alphas[j] = alpha_j_new;
                bias = new_bias;

                let row_i = k.row(i);
                let row_j = k.row(j);
                for ((e, &ki), &kj) in errors.iter_mut().zip(row_i.iter()).zip(row_j.iter()) {
                    *e += di * ki + dj * kj + db;
                }

                num_changed += 1;
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        (alphas, bias, passes >= STABLE_PASSES)
    }

    /// Compute the kernel matrix, upper triangle rows in parallel
    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (i..n).map(|j| self.kernel(x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row_vals) in rows.into_iter().enumerate() {
            for (offset, val) in row_vals.into_iter().enumerate() {
                let j = i + offset;
                k[[i, j]] = val;
                k[[j, i]] = val;
            }
        }
        k
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.config.kernel {
            KernelType::Linear => a.dot(&b),
            KernelType::Rbf { .. } => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
                (-self.gamma * norm_sq).exp()
            }
        }
    }

    /// Raw decision values (n_samples × n_machines)
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(SeverityError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(SeverityError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let n_machines = self.machines.len();
        let values: Vec<f64> = x
            .outer_iter()
            .into_par_iter()
            .flat_map_iter(|row| {
                self.machines.iter().map(move |m| {
                    if !m.has_positive {
                        return f64::NEG_INFINITY;
                    }
                    let sum: f64 = m
                        .support_vectors
                        .outer_iter()
                        .zip(m.dual_coef.iter())
                        .map(|(sv, &coef)| coef * self.kernel(sv, row))
                        .sum();
                    sum + m.bias
                })
            })
            .collect();

        Ok(Array2::from_shape_vec((x.nrows(), n_machines), values)?)
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let decision = self.decision_function(x)?;
        if self.n_classes == 2 {
            return Ok(decision.column(0).mapv(|d| if d > 0.0 { 1 } else { 0 }));
        }
        Ok(decision
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (i, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = i;
                    }
                }
                best
            })
            .collect())
    }

    /// Message describing machines that hit the pass cap, if any
    pub fn convergence_warning(&self) -> Option<String> {
        let stalled = self.machines.iter().filter(|m| !m.converged).count();
        (self.is_fitted && stalled > 0).then(|| {
            format!(
                "SVM (C={}) reached max_iter={} before converging in {} of {} machines",
                self.config.c,
                self.config.max_iter,
                stalled,
                self.machines.len()
            )
        })
    }
}

/// Deterministic stratified subsample of at most `cap` row indices
/// (each present class keeps at least one row). Indices are returned sorted.
fn stratified_subsample(y: &Array1<usize>, cap: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let n = y.len();
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &c) in y.iter().enumerate() {
        by_class.entry(c).or_default().push(i);
    }

    let mut selected = Vec::with_capacity(cap);
    for (_, mut rows) in by_class {
        rows.shuffle(rng);
        let quota = ((rows.len() * cap) as f64 / n as f64).floor() as usize;
        rows.truncate(quota.max(1));
        selected.extend(rows);
    }
    selected.sort_unstable();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<usize>) {
        let x = array![
            [0.0, 0.0], [0.5, 0.2], [0.2, 0.6], [0.4, 0.4],
            [4.0, 4.0], [4.5, 4.2], [4.2, 4.6], [4.4, 4.4],
            [0.0, 4.0], [0.3, 4.4], [0.5, 4.1], [0.2, 4.6],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2];
        (x, y)
    }

    #[test]
    fn test_linear_binary() {
        let (x, y) = blobs();
        let x = x.slice(ndarray::s![0..8, ..]).to_owned();
        let y = y.slice(ndarray::s![0..8]).to_owned();

        let mut svm = SVMClassifier::new(SVMConfig {
            kernel: KernelType::Linear,
            ..Default::default()
        });
        svm.fit(&x, &y, 2).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_rbf_multiclass() {
        let (x, y) = blobs();
        let mut svm = SVMClassifier::new(SVMConfig {
            c: 10.0,
            ..Default::default()
        });
        svm.fit(&x, &y, 3).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_subsample_is_stratified() {
        let y = Array1::from_vec((0..100).map(|i| if i < 80 { 0 } else { 1 }).collect());
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let idx = stratified_subsample(&y, 10, &mut rng);
        let ones = idx.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(idx.len(), 10);
        assert_eq!(ones, 2);
    }

    #[test]
    fn test_invalid_c() {
        let (x, y) = blobs();
        let mut svm = SVMClassifier::new(SVMConfig {
            c: -1.0,
            ..Default::default()
        });
        assert!(matches!(svm.fit(&x, &y, 3), Err(SeverityError::InvalidParameter { .. })));
    }

    #[test]
    fn test_convergence_warning_on_tiny_budget() {
        let (x, y) = blobs();
        let mut svm = SVMClassifier::new(SVMConfig {
            max_iter: 1,
            ..Default::default()
        });
        svm.fit(&x, &y, 3).unwrap();
        assert!(svm.convergence_warning().is_some());
    }
}
