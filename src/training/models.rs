//! Estimator wrapper over the supported classifier families

use super::decision_tree::DecisionTree;
use super::knn::KNNClassifier;
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use super::svm::SVMClassifier;
use crate::error::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-fatal condition recorded against a model candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// An iterative solver stopped at its iteration cap
    ConvergenceWarning { family: String, message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ConvergenceWarning { family, message } => {
                write!(f, "[{}] convergence warning: {}", family, message)
            }
        }
    }
}

/// A fitted or unfitted classifier from one of the registry families
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    SupportVector(SVMClassifier),
    KNearestNeighbors(KNNClassifier),
}

impl Estimator {
    /// Family name, matching the registry
    pub fn family(&self) -> &'static str {
        match self {
            Estimator::LogisticRegression(_) => "logistic_regression",
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::RandomForest(_) => "random_forest",
            Estimator::SupportVector(_) => "svm",
            Estimator::KNearestNeighbors(_) => "knn",
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<()> {
        match self {
            Estimator::LogisticRegression(m) => m.fit(x, y, n_classes).map(|_| ()),
            Estimator::DecisionTree(m) => m.fit(x, y, n_classes).map(|_| ()),
            Estimator::RandomForest(m) => m.fit(x, y, n_classes).map(|_| ()),
            Estimator::SupportVector(m) => m.fit(x, y, n_classes).map(|_| ()),
            Estimator::KNearestNeighbors(m) => m.fit(x, y, n_classes).map(|_| ()),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        match self {
            Estimator::LogisticRegression(m) => m.predict(x),
            Estimator::DecisionTree(m) => m.predict(x),
            Estimator::RandomForest(m) => m.predict(x),
            Estimator::SupportVector(m) => m.predict(x),
            Estimator::KNearestNeighbors(m) => m.predict(x),
        }
    }

    /// Class probabilities, or None for families without a probability model
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        match self {
            Estimator::LogisticRegression(m) => m.predict_proba(x).map(Some),
            Estimator::DecisionTree(m) => m.predict_proba(x).map(Some),
            Estimator::RandomForest(m) => m.predict_proba(x).map(Some),
            Estimator::SupportVector(_) => Ok(None),
            Estimator::KNearestNeighbors(m) => m.predict_proba(x).map(Some),
        }
    }

    pub fn supports_proba(&self) -> bool {
        !matches!(self, Estimator::SupportVector(_))
    }

    /// Diagnostics from the most recent fit
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let message = match self {
            Estimator::LogisticRegression(m) => m.convergence_warning(),
            Estimator::SupportVector(m) => m.convergence_warning(),
            _ => None,
        };
        message
            .map(|message| Diagnostic::ConvergenceWarning {
                family: self.family().to_string(),
                message,
            })
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::svm::SVMConfig;
    use ndarray::array;

    #[test]
    fn test_svm_has_no_probabilities() {
        let x = array![[0.0], [0.1], [1.0], [1.1]];
        let y = array![0, 0, 1, 1];
        let mut est = Estimator::SupportVector(SVMClassifier::new(SVMConfig::default()));
        est.fit(&x, &y, 2).unwrap();
        assert!(!est.supports_proba());
        assert!(est.predict_proba(&x).unwrap().is_none());
        assert_eq!(est.family(), "svm");
    }

    #[test]
    fn test_convergence_diagnostic() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0, 0, 1, 1];
        let mut est = Estimator::LogisticRegression(LogisticRegression::new().with_max_iter(1).with_tol(1e-12));
        est.fit(&x, &y, 2).unwrap();
        let diags = est.diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(matches!(&diags[0], Diagnostic::ConvergenceWarning { family, .. } if family == "logistic_regression"));
    }
}
