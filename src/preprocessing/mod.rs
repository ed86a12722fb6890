//! Data preprocessing module
//!
//! Provides the tabular preprocessing stages:
//! - Column/row cleaning (drop list, fill threshold, deduplication)
//! - Explicit per-column missing value imputation
//! - Sequential IQR outlier filtering
//! - One-hot categorical encoding into a named feature space
//! - Importance-based feature selection
//! - Standard scaling
//! - Target label vocabulary

mod config;
mod cleaner;
mod imputer;
mod scaler;
mod target;
pub mod encoder;
pub mod feature_selection;
pub mod outlier;

pub use config::PreprocessingConfig;
pub use cleaner::{Cleaner, CleaningReport, FillThreshold};
pub use imputer::{FillValue, ImputationPlan, ImputeStrategy, Imputer};
pub use scaler::{Scaler, ScalerParams};
pub use target::ClassLabels;
pub use encoder::{Encoder, FeatureSource, FeatureSpace, MISSING_CATEGORY};
pub use feature_selection::{FeatureSelector, ImportanceRanking, SelectedFeatureSet};
pub use outlier::{OutlierBounds, OutlierColumns, OutlierFilter};
