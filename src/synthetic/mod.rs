//! Class balancing by synthetic oversampling
//!
//! - SMOTE (Synthetic Minority Over-sampling Technique)

mod smote;

pub use smote::SMOTE;

use crate::error::Result;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Original rows followed by synthetic rows
    pub x: Array2<f64>,
    pub y: Array1<usize>,
    /// Number of synthetic samples generated per class
    pub n_synthetic: BTreeMap<usize, usize>,
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Fit the sampler on data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Resample data
    fn resample(&self, x: &Array2<f64>, y: &Array1<usize>) -> Result<ResampleResult>;

    /// Fit and resample in one step
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<ResampleResult> {
        self.fit(x, y)?;
        self.resample(x, y)
    }
}

/// Class distribution, in ascending class order
pub fn class_counts(y: &Array1<usize>) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Row indices for each class, in ascending class order
pub fn class_indices(y: &Array1<usize>) -> BTreeMap<usize, Vec<usize>> {
    let mut indices: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_default().push(i);
    }
    indices
}
