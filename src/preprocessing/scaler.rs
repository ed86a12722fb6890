//! Feature standardization

use crate::error::{SeverityError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Parameters for one fitted column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: f64,
    /// Population standard deviation (ddof = 0)
    pub std: f64,
}

/// Standard (z-score) scaler over a feature matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    params: Vec<ScalerParams>,
    is_fitted: bool,
}

impl Scaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute per-column mean and standard deviation
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(SeverityError::DegenerateData(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        self.params = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mean = col.mean().unwrap_or(0.0);
                let std = col.std(0.0);
                ScalerParams { mean, std }
            })
            .collect();

        self.is_fitted = true;
        Ok(self)
    }

    /// Standardize with the fitted parameters. Zero-variance columns map to 0.0.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(SeverityError::ModelNotFitted);
        }
        if x.ncols() != self.params.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(&self.params) {
            if p.std == 0.0 {
                col.fill(0.0);
            } else {
                col.mapv_inplace(|v| (v - p.mean) / p.std);
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map standardized values back to the original scale
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(SeverityError::ModelNotFitted);
        }
        let mut out = x.clone();
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(&self.params) {
            col.mapv_inplace(|v| v * p.std + p.mean);
        }
        Ok(out)
    }

    pub fn params(&self) -> &[ScalerParams] {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standardizes_training_partition() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let mut scaler = Scaler::new();
        let z = scaler.fit_transform(&x).unwrap();

        for col in z.axis_iter(Axis(1)) {
            assert!(col.mean().unwrap().abs() < 1e-10);
            assert!((col.std(0.0) - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_constant_shift() {
        let x = array![[1.0, 5.0], [3.0, 7.0], [5.0, 9.0]];
        let mut scaler = Scaler::new();
        let z = scaler.fit_transform(&x).unwrap();
        let shifted = scaler.transform(&(&x + 2.0)).unwrap();

        let std0 = scaler.params()[0].std;
        for i in 0..3 {
            assert!((shifted[[i, 0]] - z[[i, 0]] - 2.0 / std0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_zero_variance_outputs_zero() {
        let x = array![[7.0, 1.0], [7.0, 2.0]];
        let mut scaler = Scaler::new();
        scaler.fit(&x).unwrap();
        let z = scaler.transform(&array![[9.0, 1.5]]).unwrap();
        assert_eq!(z[[0, 0]], 0.0);
    }

    #[test]
    fn test_inverse_transform() {
        let x = array![[1.0, 2.0], [3.0, 8.0]];
        let mut scaler = Scaler::new();
        let z = scaler.fit_transform(&x).unwrap();
        let back = scaler.inverse_transform(&z).unwrap();
        assert!((&back - &x).iter().all(|d| d.abs() < 1e-10));
    }

    #[test]
    fn test_not_fitted() {
        let scaler = Scaler::new();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(SeverityError::ModelNotFitted)
        ));
    }
}
