//! Injury Severity - tabular classification of workplace-incident outcomes
//!
//! This crate trains a classifier that predicts an incident's degree of
//! injury from mixed categorical/numeric incident attributes:
//! - Cleaning, imputation and IQR outlier filtering
//! - One-hot encoding and importance-based feature selection
//! - SMOTE class balancing and standard scaling
//! - Cross-validated grid search over several classifier families
//! - A persisted artifact for offline batch prediction
//!
//! # Modules
//!
//! - [`dataset`] - Typed tabular dataset and CSV ingestion
//! - [`preprocessing`] - Cleaning, imputation, outliers, encoding, selection, scaling
//! - [`synthetic`] - Synthetic minority oversampling (SMOTE)
//! - [`training`] - Classifier families, cross-validation, metrics, model selection
//! - [`pipeline`] - End-to-end training pipeline with cancellation
//! - [`export`] - Trained artifact and its checksummed serialization
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod dataset;

// Core ML modules
pub mod preprocessing;
pub mod synthetic;
pub mod training;

// Orchestration and persistence
pub mod pipeline;
pub mod export;

// Services
pub mod cli;

pub use error::{Result, SeverityError};

/// Prelude for convenient imports
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, SeverityError};

    // Data
    pub use crate::dataset::{load_csv, Column, ColumnKind, Dataset, Record, SchemaSpec, Value};

    // Preprocessing
    pub use crate::preprocessing::{FillThreshold, ImputationPlan, ImputeStrategy, OutlierColumns, PreprocessingConfig};

    // Training
    pub use crate::training::{Estimator, ModelFamily, ModelMetrics, ModelRegistry, ModelSelector, RegistryKind};

    // Pipeline
    pub use crate::pipeline::{AbortHandle, BalancePlacement, PipelineConfig, PipelineReport, TrainingPipeline};

    // Export
    pub use crate::export::{ExportFormat, TrainedArtifact};
}
