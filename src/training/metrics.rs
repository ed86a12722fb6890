//! Classification metrics

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Per-class row of a classification report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Metrics for model evaluation on a held-out partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    /// Macro-averaged precision
    pub precision: f64,
    /// Macro-averaged recall
    pub recall: f64,
    /// Macro-averaged F1 score
    pub f1_score: f64,
    /// One-vs-rest macro ROC-AUC; None without class probabilities
    pub auc_roc: Option<f64>,
    /// Rows are true classes, columns predicted classes
    pub confusion_matrix: Vec<Vec<usize>>,
    pub per_class: Vec<ClassMetrics>,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute classification metrics. `labels` names each class index.
    pub fn compute_classification(
        y_true: &Array1<usize>,
        y_pred: &Array1<usize>,
        y_prob: Option<&Array2<f64>>,
        labels: &[String],
    ) -> Self {
        let n_classes = labels.len();
        let confusion = confusion_matrix(y_true, y_pred, n_classes);
        let (precision, recall, f1_score) = precision_recall_f1_macro(y_true, y_pred, n_classes);

        let per_class = (0..n_classes)
            .map(|c| {
                let (p, r, f) = class_scores(&confusion, c);
                ClassMetrics {
                    label: labels[c].clone(),
                    precision: p,
                    recall: r,
                    f1_score: f,
                    support: confusion[c].iter().sum(),
                }
            })
            .collect();

        Self {
            accuracy: accuracy(y_true, y_pred),
            precision,
            recall,
            f1_score,
            auc_roc: y_prob.and_then(|p| roc_auc_ovr(y_true, p)),
            confusion_matrix: confusion,
            per_class,
            n_samples: y_true.len(),
        }
    }
}

/// Fraction of exact matches (0.0 for empty input)
pub fn accuracy(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

pub fn confusion_matrix(y_true: &Array1<usize>, y_pred: &Array1<usize>, n_classes: usize) -> Vec<Vec<usize>> {
    let mut m = vec![vec![0usize; n_classes]; n_classes];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        if t < n_classes && p < n_classes {
            m[t][p] += 1;
        }
    }
    m
}

/// (precision, recall, f1) for one class; 0.0 where a ratio is undefined
fn class_scores(confusion: &[Vec<usize>], class: usize) -> (f64, f64, f64) {
    let tp = confusion[class][class] as f64;
    let predicted: usize = confusion.iter().map(|row| row[class]).sum();
    let actual: usize = confusion[class].iter().sum();

    let precision = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
    let recall = if actual > 0 { tp / actual as f64 } else { 0.0 };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    (precision, recall, f1)
}

/// Macro precision, recall and F1 over the classes that occur in either
/// `y_true` or `y_pred`
pub fn precision_recall_f1_macro(
    y_true: &Array1<usize>,
    y_pred: &Array1<usize>,
    n_classes: usize,
) -> (f64, f64, f64) {
    let confusion = confusion_matrix(y_true, y_pred, n_classes);
    let occurring: Vec<usize> = (0..n_classes)
        .filter(|&c| confusion[c].iter().sum::<usize>() > 0 || confusion.iter().any(|row| row[c] > 0))
        .collect();
    if occurring.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let (mut p_sum, mut r_sum, mut f_sum) = (0.0, 0.0, 0.0);
    for &c in &occurring {
        let (p, r, f) = class_scores(&confusion, c);
        p_sum += p;
        r_sum += r;
        f_sum += f;
    }
    let k = occurring.len() as f64;
    (p_sum / k, r_sum / k, f_sum / k)
}

/// Binary ROC-AUC via the rank-sum (Mann-Whitney) statistic; tied scores get
/// their average rank. None unless both positives and negatives are present.
pub fn roc_auc_binary(is_positive: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = is_positive.iter().filter(|&&p| p).count();
    let n_neg = is_positive.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks.iter().zip(is_positive).filter(|(_, &p)| p).map(|(r, _)| r).sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos as f64 * n_neg as f64))
}

/// One-vs-rest macro ROC-AUC over classes that have both positive and
/// negative samples in `y_true`
pub fn roc_auc_ovr(y_true: &Array1<usize>, proba: &Array2<f64>) -> Option<f64> {
    let aucs: Vec<f64> = (0..proba.ncols())
        .filter_map(|c| {
            let is_pos: Vec<bool> = y_true.iter().map(|&t| t == c).collect();
            let scores = proba.column(c).to_vec();
            roc_auc_binary(&is_pos, &scores)
        })
        .collect();

    if aucs.is_empty() {
        None
    } else {
        Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
    }
}
