//! Model training module
//!
//! Provides the classifier families searched by the model selector:
//! - Multinomial logistic regression
//! - Decision trees and Random Forests
//! - Support Vector Machines (linear and RBF kernels)
//! - K-Nearest Neighbors
//!
//! plus stratified cross-validation, classification metrics, hyperparameter
//! grids and the selector that ties them together.

mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;
pub mod search;
pub mod selector;
pub mod svm;

pub use cross_validation::{stratified_train_test_split, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
pub use linear_models::LogisticRegression;
pub use metrics::{ClassMetrics, ModelMetrics};
pub use models::{Diagnostic, Estimator};
pub use random_forest::{MaxFeatures, RandomForest};
pub use search::{FamilySpec, ModelFamily, ModelRegistry, ParamGrid, ParameterValue, RegistryKind, TrialParams};
pub use selector::{
    CandidateSummary, ComboResult, FamilyState, ModelCandidate, ModelSelector, SelectionReport, SelectorState,
};
pub use svm::{KernelType, SVMClassifier, SVMConfig};
