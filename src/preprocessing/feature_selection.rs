//! Importance-based feature selection
//!
//! A seeded random forest is fitted only to score features; features whose
//! normalized importance exceeds a threshold are retained.

use crate::error::{SeverityError, Result};
use crate::training::RandomForest;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Feature name → non-negative importance, summing to 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRanking {
    names: Vec<String>,
    scores: Vec<f64>,
}

impl ImportanceRanking {
    /// Normalize raw scores; all-zero (or empty-sum) scores become uniform
    pub fn from_raw(names: Vec<String>, raw: &[f64]) -> Self {
        let total: f64 = raw.iter().map(|v| v.max(0.0)).sum();
        let scores = if total > 0.0 {
            raw.iter().map(|v| v.max(0.0) / total).collect()
        } else {
            vec![1.0 / names.len().max(1) as f64; names.len()]
        };
        Self { names, scores }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.scores[i])
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// (name, score) pairs from most to least important; ties keep feature order
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut pairs: Vec<(&str, f64)> = self.names.iter().map(String::as_str).zip(self.scores.iter().copied()).collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }
}

/// Non-empty ordered subset of the feature space (feature-space order kept)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFeatureSet {
    names: Vec<String>,
    indices: Vec<usize>,
    n_features_in: usize,
}

impl SelectedFeatureSet {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Keep only the selected columns of an encoded matrix
    pub fn select(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features_in {
            return Err(SeverityError::ShapeError {
                expected: format!("{} encoded features", self.n_features_in),
                actual: format!("{} encoded features", x.ncols()),
            });
        }
        Ok(x.select(Axis(1), &self.indices))
    }
}

/// Feature selector for dimensionality reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSelector {
    threshold: f64,
    n_estimators: usize,
    random_state: u64,
    ranking: Option<ImportanceRanking>,
    selected: Option<SelectedFeatureSet>,
}

impl Default for FeatureSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureSelector {
    pub fn new() -> Self {
        Self {
            threshold: 0.01,
            n_estimators: 100,
            random_state: 42,
            ranking: None,
            selected: None,
        }
    }

    /// Importance a feature must exceed to be kept
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Size of the scoring forest
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Score features and choose the subset
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_classes: usize,
        feature_names: &[String],
    ) -> Result<&mut Self> {
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(SeverityError::invalid_parameter(
                "importance_threshold",
                self.threshold,
                "must be a non-negative number",
            ));
        }
        if x.ncols() == 0 {
            return Err(SeverityError::DegenerateData("no encoded features to select from".to_string()));
        }
        if feature_names.len() != x.ncols() {
            return Err(SeverityError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }

        let mut forest = RandomForest::new(self.n_estimators).with_random_state(self.random_state);
        forest.fit(x, y, n_classes)?;
        let raw: Vec<f64> = forest
            .feature_importances()
            .map(|imp| imp.to_vec())
            .unwrap_or_else(|| vec![0.0; x.ncols()]);

        if raw.iter().all(|&v| v == 0.0) {
            warn!("Scoring forest produced all-zero importances, falling back to uniform scores");
        }
        let ranking = ImportanceRanking::from_raw(feature_names.to_vec(), &raw);

        let mut indices: Vec<usize> = ranking
            .scores()
            .iter()
            .enumerate()
            .filter(|(_, &s)| s > self.threshold)
            .map(|(i, _)| i)
            .collect();

        if indices.is_empty() {
            // Earliest feature wins a tie for the top score
            let mut best = 0;
            for (i, &s) in ranking.scores().iter().enumerate() {
                if s > ranking.scores()[best] {
                    best = i;
                }
            }
            warn!(
                threshold = self.threshold,
                feature = %feature_names[best],
                "No feature exceeded the importance threshold, keeping the top feature"
            );
            indices.push(best);
        }

        info!(
            encoded = x.ncols(),
            selected = indices.len(),
            threshold = self.threshold,
            "Selected features by importance"
        );

        self.selected = Some(SelectedFeatureSet {
            names: indices.iter().map(|&i| feature_names[i].clone()).collect(),
            indices,
            n_features_in: x.ncols(),
        });
        self.ranking = Some(ranking);
        Ok(self)
    }

    /// Transform data by selecting features
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.selected.as_ref().ok_or(SeverityError::ModelNotFitted)?.select(x)
    }

    pub fn fit_transform(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_classes: usize,
        feature_names: &[String],
    ) -> Result<Array2<f64>> {
        self.fit(x, y, n_classes, feature_names)?;
        self.transform(x)
    }

    pub fn ranking(&self) -> Option<&ImportanceRanking> {
        self.ranking.as_ref()
    }

    pub fn selected(&self) -> Option<&SelectedFeatureSet> {
        self.selected.as_ref()
    }

    /// Consume the selector, keeping the fitted subset
    pub fn into_selected(self) -> Result<SelectedFeatureSet> {
        self.selected.ok_or(SeverityError::ModelNotFitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    fn signal_and_noise() -> (Array2<f64>, Array1<usize>) {
        let n = 120;
        let mut x = Array2::zeros((n, 4));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let class = i % 2;
            x[[i, 0]] = class as f64 + ((i * 7) % 10) as f64 * 0.01;
            x[[i, 1]] = ((i * 13) % 17) as f64;
            x[[i, 2]] = 3.0;
            x[[i, 3]] = ((i * 5) % 11) as f64;
            y[i] = class;
        }
        (x, y)
    }

    #[test]
    fn test_ranking_sums_to_one_and_keeps_signal() {
        let (x, y) = signal_and_noise();
        let mut selector = FeatureSelector::new().with_n_estimators(30);
        selector.fit(&x, &y, 2, &names(4)).unwrap();

        let ranking = selector.ranking().unwrap();
        assert!((ranking.scores().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(ranking.get("f2"), Some(0.0));
        assert_eq!(ranking.sorted()[0].0, "f0");

        let selected = selector.selected().unwrap();
        assert!(selected.contains("f0"));
        assert!(!selected.contains("f2"));
    }

    #[test]
    fn test_never_empty() {
        let (x, y) = signal_and_noise();
        let mut selector = FeatureSelector::new().with_threshold(1.0).with_n_estimators(10);
        let out = selector.fit_transform(&x, &y, 2, &names(4)).unwrap();
        assert_eq!(out.ncols(), 1);
        assert_eq!(selector.selected().unwrap().len(), 1);
    }

    #[test]
    fn test_uniform_fallback() {
        let ranking = ImportanceRanking::from_raw(names(4), &[0.0; 4]);
        assert!(ranking.scores().iter().all(|&s| (s - 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_constant_features_fall_back_to_first() {
        let x = Array2::from_elem((10, 3), 1.0);
        let y = Array1::from_vec(vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);
        let mut selector = FeatureSelector::new().with_threshold(0.5).with_n_estimators(5);
        selector.fit(&x, &y, 2, &names(3)).unwrap();
        assert_eq!(selector.selected().unwrap().names(), &["f0".to_string()]);
    }
}
