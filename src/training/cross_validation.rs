//! Cross-validation splitters

use crate::error::{SeverityError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => *n_splits,
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: 42,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn strategy(&self) -> CVStrategy {
        self.strategy
    }

    /// Generate train/test splits over class-index targets
    pub fn split(&self, y: &Array1<usize>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(SeverityError::invalid_parameter("n_splits", n_splits, "must be at least 2"));
        }
        if y.len() < n_splits {
            return Err(SeverityError::DegenerateData(format!(
                "{} samples cannot fill {} folds",
                y.len(),
                n_splits
            )));
        }

        match self.strategy {
            CVStrategy::KFold { shuffle, .. } => Ok(self.k_fold_split(y.len(), n_splits, shuffle)),
            CVStrategy::StratifiedKFold { shuffle, .. } => self.stratified_k_fold_split(y, n_splits, shuffle),
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }
        splits
    }

    /// Classes are visited in ascending order; within a class the (shuffled)
    /// rows are dealt round-robin, continuing from where the previous class
    /// stopped so fold sizes differ by at most one.
    fn stratified_k_fold_split(
        &self,
        y: &Array1<usize>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        let class_indices = group_by_class(y);

        if let Some((class, rows)) = class_indices.iter().find(|(_, rows)| rows.len() < n_splits) {
            return Err(SeverityError::DegenerateData(format!(
                "class {} has {} samples, fewer than the {} folds",
                class,
                rows.len(),
                n_splits
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next_fold = 0;

        for (_, mut indices) in class_indices {
            if shuffle {
                indices.shuffle(&mut rng);
            }
            for idx in indices {
                folds[next_fold].push(idx);
                next_fold = (next_fold + 1) % n_splits;
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();

                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

fn group_by_class(y: &Array1<usize>) -> BTreeMap<usize, Vec<usize>> {
    let mut class_indices: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, &class) in y.iter().enumerate() {
        class_indices.entry(class).or_default().push(idx);
    }
    class_indices
}

/// Stratified hold-out split. Returns sorted (train, test) row indices.
///
/// Each class contributes `round(count * test_fraction)` rows to the test
/// side, keeping at least one row of every class in the training side.
pub fn stratified_train_test_split(
    y: &Array1<usize>,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SeverityError::invalid_parameter(
            "test_fraction",
            test_fraction,
            "must lie strictly between 0 and 1",
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();

    for (_, mut indices) in group_by_class(y) {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64 * test_fraction).round() as usize).min(indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    if test.is_empty() {
        return Err(SeverityError::DegenerateData(
            "test partition is empty; not enough rows per class".to_string(),
        ));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Array1<usize> {
        Array1::from_vec((0..50).map(|i| if i < 35 { 0 } else if i < 45 { 1 } else { 2 }).collect())
    }

    #[test]
    fn test_stratified_folds_partition_rows() {
        let y = labels();
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true });
        let splits = cv.split(&y).unwrap();
        assert_eq!(splits.len(), 5);

        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());

        for split in &splits {
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 50);
            assert_eq!(split.test_indices.len(), 10);
            let minority = split.test_indices.iter().filter(|&&i| y[i] == 2).count();
            assert_eq!(minority, 1);
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let y = labels();
        let cv = CrossValidator::new(CVStrategy::default()).with_random_state(9);
        assert_eq!(cv.split(&y).unwrap(), cv.split(&y).unwrap());
    }

    #[test]
    fn test_class_smaller_than_folds() {
        let y = Array1::from_vec(vec![0, 0, 0, 0, 0, 0, 1, 1]);
        let cv = CrossValidator::new(CVStrategy::default());
        assert!(matches!(cv.split(&y), Err(SeverityError::DegenerateData(_))));
    }

    #[test]
    fn test_kfold_sizes() {
        let y = Array1::from_vec(vec![0; 11]);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: false });
        let sizes: Vec<usize> = cv.split(&y).unwrap().iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
    }

    #[test]
    fn test_train_test_split_stratified() {
        let y = labels();
        let (train, test) = stratified_train_test_split(&y, 0.2, 42).unwrap();
        assert_eq!(train.len() + test.len(), 50);
        assert_eq!(test.iter().filter(|&&i| y[i] == 0).count(), 7);
        assert_eq!(test.iter().filter(|&&i| y[i] == 1).count(), 2);
        assert_eq!(test.iter().filter(|&&i| y[i] == 2).count(), 1);
    }
}
