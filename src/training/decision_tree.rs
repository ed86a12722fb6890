//! Decision tree classifier

use crate::error::{SeverityError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Nodes with at least this many samples scan features in parallel
const PARALLEL_SPLIT_MIN_SAMPLES: usize = 4096;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the class distribution of its training samples
    Leaf {
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    Gini,
    Entropy,
}

impl Criterion {
    fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => 1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>(),
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// Best split found for a node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree classifier over class indices `0..n_classes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth (None = grow until pure)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random per node (None = all)
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
    n_features: usize,
    n_classes: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            n_classes: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(SeverityError::invalid_parameter(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(SeverityError::invalid_parameter(
                "min_samples_leaf",
                self.min_samples_leaf,
                "must be at least 1",
            ));
        }
        if self.max_depth == Some(0) {
            return Err(SeverityError::invalid_parameter("max_depth", 0, "must be positive"));
        }
        if self.max_features == Some(0) {
            return Err(SeverityError::invalid_parameter("max_features", 0, "must be positive"));
        }
        Ok(())
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<&mut Self> {
        self.validate()?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(SeverityError::TrainingError("cannot fit a tree on zero samples".to_string()));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(SeverityError::TrainingError(format!(
                "class index {} out of range for {} classes",
                bad, n_classes
            )));
        }

        self.n_features = n_features;
        self.n_classes = n_classes;

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];
        let indices: Vec<usize> = (0..n_samples).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut importances, &mut rng));

        // Normalize feature importances
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn class_counts(&self, y: &Array1<usize>, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[y[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], n_samples: usize) -> TreeNode {
        let n = n_samples.max(1) as f64;
        TreeNode::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / n).collect(),
            n_samples,
        }
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let counts = self.class_counts(y, indices);
        let is_pure = counts.iter().filter(|&&c| c > 0).count() <= 1;

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || is_pure;

        if should_stop {
            return self.leaf(&counts, n_samples);
        }

        let parent_impurity = self.criterion.impurity(&counts, n_samples);
        let features = self.candidate_features(rng);

        let Some(best) = self.find_best_split(x, y, indices, &features, parent_impurity) else {
            return self.leaf(&counts, n_samples);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += n_samples as f64 * best.gain;

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        match self.max_features {
            Some(k) if k < self.n_features => {
                features.shuffle(rng);
                features.truncate(k);
                features.sort_unstable();
                features
            }
            _ => features,
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        indices: &[usize],
        features: &[usize],
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let scan = |&feature_idx: &usize| self.best_split_for_feature(x, y, indices, feature_idx, parent_impurity);

        let results: Vec<Option<SplitCandidate>> = if indices.len() >= PARALLEL_SPLIT_MIN_SAMPLES {
            features.par_iter().map(scan).collect()
        } else {
            features.iter().map(scan).collect()
        };

        // Strictly greater keeps the lowest feature index on ties
        results.into_iter().flatten().fold(None, |best: Option<SplitCandidate>, cand| match best {
            Some(b) if b.gain >= cand.gain => Some(b),
            _ => Some(cand),
        })
    }

    /// Sort the node's samples by one feature and sweep the thresholds,
    /// updating class counts incrementally.
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<usize>,
        indices: &[usize],
        feature_idx: usize,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let mut order: Vec<(f64, usize)> = indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = vec![0usize; self.n_classes];
        let mut right = vec![0usize; self.n_classes];
        for &(_, c) in &order {
            right[c] += 1;
        }

        let mut best: Option<SplitCandidate> = None;
        for pos in 0..n - 1 {
            let (value, class) = order[pos];
            left[class] += 1;
            right[class] -= 1;

            let next = order[pos + 1].0;
            if next <= value {
                continue;
            }
            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let weighted = (n_left as f64 * self.criterion.impurity(&left, n_left)
                + n_right as f64 * self.criterion.impurity(&right, n_right))
                / n as f64;
            let gain = parent_impurity - weighted;

            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                let mut threshold = (value + next) / 2.0;
                // midpoint can round up to `next` for adjacent floats
                if threshold >= next {
                    threshold = value;
                }
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold,
                    gain,
                });
            }
        }
        best
    }

    fn leaf_for<'a>(&'a self, mut node: &'a TreeNode, sample: ArrayView1<f64>) -> &'a [f64] {
        loop {
            match node {
                TreeNode::Leaf { distribution, .. } => return distribution,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<&TreeNode> {
        let root = self.root.as_ref().ok_or(SeverityError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(SeverityError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(root)
    }

    /// Class probabilities from leaf distributions
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.check_input(x)?;
        let mut out = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let dist = self.leaf_for(root, row);
            for (k, &p) in dist.iter().enumerate() {
                out[[i, k]] = p;
            }
        }
        Ok(out)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let root = self.check_input(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| argmax(self.leaf_for(root, row)))
            .collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        fn depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth(left).max(depth(right)),
            }
        }
        self.root.as_ref().map_or(0, depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        fn leaves(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => leaves(left) + leaves(right),
            }
        }
        self.root.as_ref().map_or(0, leaves)
    }
}

/// Index of the largest value; ties go to the lowest index
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y, 2).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0], [5.0, 1.0], [6.0, 0.0]];
        let y = array![0, 1, 0, 1, 2, 2];

        let mut tree = DecisionTree::new().with_max_depth(Some(2));
        tree.fit(&x, &y, 3).unwrap();

        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y, 2).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert!((importances[0] - 1.0).abs() < 1e-12);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let x = array![[0.0], [0.0], [1.0], [1.0], [1.0]];
        let y = array![0, 1, 1, 1, 2];
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y, 3).unwrap();
        let proba = tree.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        // identical points cannot be separated
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_min_samples_split() {
        let x = array![[0.0], [1.0]];
        let y = array![0, 1];
        let mut tree = DecisionTree::new().with_min_samples_split(1);
        assert!(matches!(
            tree.fit(&x, &y, 2),
            Err(SeverityError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_not_fitted() {
        let tree = DecisionTree::new();
        assert!(tree.predict(&array![[1.0]]).is_err());
    }
}
