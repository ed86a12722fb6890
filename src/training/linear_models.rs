//! Multinomial logistic regression

use crate::error::{SeverityError, Result};
use super::decision_tree::argmax;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Softmax logistic regression with L2 penalty, trained by accelerated
/// full-batch gradient descent.
///
/// The objective is the mean cross-entropy plus `||W||² / (2·C·n)`, which
/// matches the usual "inverse regularization strength" meaning of `C`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients (n_features × n_classes)
    pub coefficients: Option<Array2<f64>>,
    /// Fitted intercepts (n_classes)
    pub intercept: Option<Array1<f64>>,
    /// Inverse regularization strength
    pub c: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance on the largest gradient component
    pub tol: f64,
    /// Iterations actually run
    pub n_iter: usize,
    /// Whether the last fit met the tolerance
    pub converged: bool,
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            n_iter: 0,
            converged: false,
            is_fitted: false,
        }
    }

    /// Set inverse regularization strength
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Row-wise softmax, shifted by the row max for stability
    fn softmax(z: &mut Array2<f64>) {
        for mut row in z.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
    }

    fn gradient(
        x: &Array2<f64>,
        targets: &Array2<f64>,
        w: &Array2<f64>,
        b: &Array1<f64>,
        reg: f64,
    ) -> (Array2<f64>, Array1<f64>) {
        let n = x.nrows() as f64;
        let mut p = x.dot(w) + b;
        Self::softmax(&mut p);
        let residual = p - targets;
        let gw = x.t().dot(&residual) / n + w * reg;
        let gb = residual.sum_axis(Axis(0)) / n;
        (gw, gb)
    }

    /// Fit the model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(SeverityError::invalid_parameter("C", self.c, "must be a positive number"));
        }
        if self.max_iter == 0 {
            return Err(SeverityError::invalid_parameter("max_iter", 0, "must be positive"));
        }
        if n_samples != y.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 || n_classes < 2 {
            return Err(SeverityError::TrainingError(
                "logistic regression needs samples from at least two classes".to_string(),
            ));
        }

        let mut targets = Array2::zeros((n_samples, n_classes));
        for (i, &c) in y.iter().enumerate() {
            if c >= n_classes {
                return Err(SeverityError::TrainingError(format!(
                    "class index {} out of range for {} classes",
                    c, n_classes
                )));
            }
            targets[[i, c]] = 1.0;
        }

        let reg = 1.0 / (self.c * n_samples as f64);
        // Lipschitz bound of the gradient: softmax curvature <= 1/2 times mean squared row norm
        let mean_sq_norm = x.iter().map(|v| v * v).sum::<f64>() / n_samples as f64;
        let step = 1.0 / (0.5 * (mean_sq_norm + 1.0) + reg);

        let mut w = Array2::zeros((n_features, n_classes));
        let mut b = Array1::zeros(n_classes);
        let mut w_prev = w.clone();
        let mut b_prev = b.clone();

        self.converged = false;
        self.n_iter = 0;
        for t in 1..=self.max_iter {
            let momentum = (t as f64 - 1.0) / (t as f64 + 2.0);
            let vw = &w + &((&w - &w_prev) * momentum);
            let vb = &b + &((&b - &b_prev) * momentum);

            let (gw, gb) = Self::gradient(x, &targets, &vw, &vb, reg);
            let grad_max = gw
                .iter()
                .chain(gb.iter())
                .fold(0.0f64, |m, v| m.max(v.abs()));

            w_prev = w;
            b_prev = b;
            w = vw - gw * step;
            b = vb - gb * step;
            self.n_iter = t;

            if !grad_max.is_finite() {
                return Err(SeverityError::TrainingError(
                    "logistic regression diverged".to_string(),
                ));
            }
            if grad_max < self.tol {
                self.converged = true;
                break;
            }
        }

        self.coefficients = Some(w);
        self.intercept = Some(b);
        self.is_fitted = true;
        Ok(self)
    }

    /// Class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(w), Some(b)) = (&self.coefficients, &self.intercept) else {
            return Err(SeverityError::ModelNotFitted);
        };
        if x.ncols() != w.nrows() {
            return Err(SeverityError::ShapeError {
                expected: format!("{} features", w.nrows()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let mut p = x.dot(w) + b;
        Self::softmax(&mut p);
        Ok(p)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.rows().into_iter().map(|row| argmax(&row.to_vec())).collect())
    }

    /// Message describing a non-converged fit, if any
    pub fn convergence_warning(&self) -> Option<String> {
        (self.is_fitted && !self.converged).then(|| {
            format!(
                "logistic regression (C={}) did not converge in {} iterations",
                self.c, self.max_iter
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression_separable() {
        let x = array![
            [-2.0, -1.0], [-1.5, -2.0], [-1.0, -1.5],
            [1.0, 1.5], [1.5, 2.0], [2.0, 1.0],
        ];
        let y = array![0, 0, 0, 1, 1, 1];

        let mut model = LogisticRegression::new().with_c(10.0);
        model.fit(&x, &y, 2).unwrap();
        assert!(model.is_fitted);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_multiclass_probabilities() {
        let x = array![[0.0, 0.0], [0.1, 0.0], [5.0, 0.0], [5.1, 0.0], [0.0, 5.0], [0.0, 5.1]];
        let y = array![0, 0, 1, 1, 2, 2];

        let mut model = LogisticRegression::new().with_c(10.0);
        model.fit(&x, &y, 3).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_convergence_warning_on_tiny_budget() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0, 0, 1, 1];
        let mut model = LogisticRegression::new().with_max_iter(2).with_tol(1e-12);
        model.fit(&x, &y, 2).unwrap();
        assert!(model.convergence_warning().is_some());
    }

    #[test]
    fn test_invalid_c() {
        let x = array![[0.0], [1.0]];
        let y = array![0, 1];
        let mut model = LogisticRegression::new().with_c(0.0);
        assert!(model.fit(&x, &y, 2).is_err());
    }
}
