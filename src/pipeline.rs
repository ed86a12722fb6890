//! End-to-end training pipeline
//!
//! Runs the stages in order: clean, impute, filter outliers, encode, select
//! features, split, balance, scale, and search/select a model. The result is
//! a [`TrainedArtifact`] that owns every fitted stage, plus a
//! [`PipelineReport`] describing what each stage did.

use crate::dataset::{ColumnKind, Dataset};
use crate::error::{Result, SeverityError};
use crate::export::{ArtifactMetadata, TrainedArtifact};
use crate::preprocessing::{
    ClassLabels, Cleaner, CleaningReport, Encoder, FeatureSelector, Imputer, OutlierBounds, OutlierFilter,
    PreprocessingConfig, Scaler,
};
use crate::synthetic::{class_counts, Sampler, SMOTE};
use crate::training::{stratified_train_test_split, ModelRegistry, ModelSelector, RegistryKind, SelectionReport};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Where class balancing happens relative to the train/test split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePlacement {
    /// Balance the training partition only
    #[default]
    TrainingOnly,
    /// Balance the whole dataset, then split (synthetic rows reach the test set)
    BeforeSplit,
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column holding the severity label
    pub target_column: String,
    pub preprocessing: PreprocessingConfig,
    pub balance_placement: BalancePlacement,
    /// Neighbours used by SMOTE
    pub smote_k: usize,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub registry: RegistryKind,
    /// Worker threads for the model search; None uses every core
    pub n_jobs: Option<usize>,
    pub random_state: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_column: "target".to_string(),
            preprocessing: PreprocessingConfig::default(),
            balance_placement: BalancePlacement::default(),
            smote_k: 5,
            test_fraction: 0.2,
            cv_folds: 5,
            registry: RegistryKind::Standard,
            n_jobs: None,
            random_state: 42,
        }
    }
}

impl PipelineConfig {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            ..Self::default()
        }
    }

    /// Settings of the OSHA degree-of-injury study
    pub fn osha() -> Self {
        Self {
            target_column: "degree_of_inj".to_string(),
            preprocessing: PreprocessingConfig::osha(),
            ..Self::default()
        }
    }

    /// Read a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_target(mut self, target_column: impl Into<String>) -> Self {
        self.target_column = target_column.into();
        self
    }

    pub fn with_preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    pub fn with_balance_placement(mut self, placement: BalancePlacement) -> Self {
        self.balance_placement = placement;
        self
    }

    pub fn with_smote_k(mut self, k: usize) -> Self {
        self.smote_k = k;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_registry(mut self, registry: RegistryKind) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.target_column.is_empty() {
            return Err(SeverityError::invalid_parameter("target_column", "", "must not be empty"));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(SeverityError::invalid_parameter(
                "test_fraction",
                self.test_fraction,
                "must lie strictly between 0 and 1",
            ));
        }
        if self.cv_folds < 2 {
            return Err(SeverityError::invalid_parameter("cv_folds", self.cv_folds, "must be at least 2"));
        }
        if self.smote_k == 0 {
            return Err(SeverityError::invalid_parameter("smote_k", self.smote_k, "must be at least 1"));
        }
        Ok(())
    }
}

/// Shared cancellation flag, checked at stage boundaries
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the pipeline stops before its next stage
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What every stage of a run did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub target_column: String,
    pub rows_in: usize,
    pub rows_after_cleaning: usize,
    /// Rows removed because the target was still missing after imputation
    pub rows_missing_target: usize,
    pub rows_after_outliers: usize,
    pub cleaning: CleaningReport,
    pub imputed_columns: Vec<String>,
    pub outlier_bounds: Vec<OutlierBounds>,
    pub class_labels: Vec<String>,
    pub n_encoded_features: usize,
    pub selected_features: Vec<String>,
    /// (feature, importance), most important first
    pub importance: Vec<(String, f64)>,
    pub n_train: usize,
    pub n_test: usize,
    /// Training-partition class counts before and after balancing
    pub class_counts_before_balance: BTreeMap<String, usize>,
    pub class_counts_after_balance: BTreeMap<String, usize>,
    pub selection: SelectionReport,
    pub elapsed_secs: f64,
}

/// Orchestrates the preprocessing stages and the model search
pub struct TrainingPipeline {
    config: PipelineConfig,
    registry: ModelRegistry,
    abort: Option<AbortHandle>,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let registry = ModelRegistry::from_kind(config.registry);
        Self {
            config,
            registry,
            abort: None,
        }
    }

    /// Replace the registry chosen by the configuration
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = Some(handle);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.abort.as_ref().is_some_and(AbortHandle::is_aborted) {
            info!(stage, "Pipeline cancelled");
            return Err(SeverityError::Cancelled {
                stage: stage.to_string(),
            });
        }
        debug!(stage, "Entering stage");
        Ok(())
    }

    /// Train on a raw dataset
    pub fn run(&self, dataset: Dataset) -> Result<(TrainedArtifact, PipelineReport)> {
        let start = Instant::now();
        let config = &self.config;
        let pre = &config.preprocessing;
        let target = config.target_column.as_str();
        config.validate()?;

        let rows_in = dataset.n_rows();
        info!(rows = rows_in, columns = dataset.n_cols(), target, "Starting training pipeline");

        // Clean
        self.checkpoint("clean")?;
        dataset.require(target)?;
        if dataset.is_empty() {
            return Err(SeverityError::DegenerateData("dataset has no rows".to_string()));
        }
        let cleaner = Cleaner::new(pre.drop_columns.clone(), pre.fill_threshold)
            .with_protected(vec![target.to_string()]);
        let (dataset, cleaning) = cleaner.clean(dataset)?;
        if !dataset.has_column(target) {
            return Err(SeverityError::SchemaError(format!(
                "target column '{}' was removed by the drop list",
                target
            )));
        }
        let rows_after_cleaning = dataset.n_rows();

        // Impute
        self.checkpoint("impute")?;
        let plan = if pre.impute_by_kind {
            pre.imputation.extended_by_kind(&dataset, &[target])
        } else {
            pre.imputation.clone()
        };
        let mut imputer = Imputer::new();
        let dataset = imputer.fit_transform(dataset, &plan)?;
        let imputed_columns: Vec<String> = imputer.fills().keys().cloned().collect();

        let rows_missing_target = dataset.require(target)?.missing_count();
        if rows_missing_target > 0 {
            info!(rows = rows_missing_target, "Dropping rows with a missing target");
        }
        let dataset = dataset.drop_missing(target)?;

        // Outliers
        self.checkpoint("outliers")?;
        let outlier_columns = pre.outlier_columns.resolve(&dataset, &[target]);
        let (dataset, outlier_bounds) = OutlierFilter::new(pre.outlier_factor).filter(dataset, &outlier_columns)?;
        let rows_after_outliers = dataset.n_rows();
        if dataset.is_empty() {
            return Err(SeverityError::DegenerateData("no rows left after cleaning".to_string()));
        }

        // Target
        let (target_col, features) = dataset.split_column(target)?;
        let labels = ClassLabels::fit(&target_col)?;
        let y = labels.encode(&target_col)?;
        let n_classes = labels.len();
        if n_classes < 2 {
            return Err(SeverityError::DegenerateData(format!(
                "target column '{}' has a single class '{}'",
                target,
                labels.labels()[0]
            )));
        }
        for (&class, &count) in &class_counts(&y) {
            if count < config.cv_folds {
                return Err(SeverityError::DegenerateData(format!(
                    "class '{}' has {} rows, fewer than {} folds",
                    labels.labels()[class],
                    count,
                    config.cv_folds
                )));
            }
        }
        let input_schema = features.schema();

        // Encode
        self.checkpoint("encode")?;
        let categorical = match &pre.categorical_columns {
            Some(columns) => columns.clone(),
            None => features.names_of_kind(ColumnKind::Categorical),
        };
        let mut encoder = Encoder::new();
        let x_encoded = encoder.fit_transform(&features, &categorical)?;
        if x_encoded.ncols() == 0 {
            return Err(SeverityError::DegenerateData("no usable feature columns".to_string()));
        }
        let n_encoded_features = x_encoded.ncols();

        // Select
        self.checkpoint("select")?;
        let mut selector = FeatureSelector::new()
            .with_threshold(pre.importance_threshold)
            .with_n_estimators(pre.importance_estimators)
            .with_random_state(config.random_state);
        let x_selected = selector.fit_transform(&x_encoded, &y, n_classes, encoder.feature_space().names())?;
        let importance: Vec<(String, f64)> = selector
            .ranking()
            .map(|r| r.sorted().into_iter().map(|(n, s)| (n.to_string(), s)).collect())
            .unwrap_or_default();
        let selected = selector.into_selected()?;

        // Split and balance
        self.checkpoint("balance")?;
        let mut smote = SMOTE::new().with_k_neighbors(config.smote_k).with_seed(config.random_state);
        let (x_train, y_train, x_test, y_test, counts_before) = match config.balance_placement {
            BalancePlacement::TrainingOnly => {
                let (train_idx, test_idx) = stratified_train_test_split(&y, config.test_fraction, config.random_state)?;
                let (x_train, y_train) = take(&x_selected, &y, &train_idx);
                let (x_test, y_test) = take(&x_selected, &y, &test_idx);
                let before = class_counts(&y_train);
                let balanced = smote.fit_resample(&x_train, &y_train)?;
                (balanced.x, balanced.y, x_test, y_test, before)
            }
            BalancePlacement::BeforeSplit => {
                let before = class_counts(&y);
                let balanced = smote.fit_resample(&x_selected, &y)?;
                let (train_idx, test_idx) =
                    stratified_train_test_split(&balanced.y, config.test_fraction, config.random_state)?;
                let (x_train, y_train) = take(&balanced.x, &balanced.y, &train_idx);
                let (x_test, y_test) = take(&balanced.x, &balanced.y, &test_idx);
                (x_train, y_train, x_test, y_test, before)
            }
        };
        let counts_after = class_counts(&y_train);
        info!(
            train = y_train.len(),
            test = y_test.len(),
            placement = ?config.balance_placement,
            "Balanced classes with SMOTE"
        );

        // Scale
        self.checkpoint("scale")?;
        let mut scaler = Scaler::new();
        let x_train = scaler.fit_transform(&x_train)?;
        let x_test = scaler.transform(&x_test)?;

        // Model selection
        self.checkpoint("model_selection")?;
        let mut model_selector = ModelSelector::new(self.registry.clone())
            .with_cv_folds(config.cv_folds)
            .with_random_state(config.random_state)
            .with_n_jobs(config.n_jobs);
        model_selector.search(&x_train, &y_train, n_classes)?;
        self.checkpoint("evaluate")?;
        model_selector.evaluate(&x_test, &y_test, labels.labels())?;
        model_selector.select()?;
        let (estimator, selection) = model_selector.take_selected()?;

        let named_counts = |counts: &BTreeMap<usize, usize>| -> BTreeMap<String, usize> {
            counts.iter().map(|(&c, &n)| (labels.labels()[c].clone(), n)).collect()
        };

        let metadata = ArtifactMetadata::new(target)
            .with_selection(&selection)
            .with_shape(y_train.len(), n_encoded_features, selected.len());
        let report = PipelineReport {
            target_column: target.to_string(),
            rows_in,
            rows_after_cleaning,
            rows_missing_target,
            rows_after_outliers,
            cleaning,
            imputed_columns,
            outlier_bounds,
            class_labels: labels.labels().to_vec(),
            n_encoded_features,
            selected_features: selected.names().to_vec(),
            importance,
            n_train: y_train.len(),
            n_test: y_test.len(),
            class_counts_before_balance: named_counts(&counts_before),
            class_counts_after_balance: named_counts(&counts_after),
            selection,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            family = %report.selection.selected_family,
            params = %report.selection.selected_params,
            cv_score = %format!("{:.4}", report.selection.cv_score),
            elapsed_secs = %format!("{:.2}", report.elapsed_secs),
            "Training pipeline finished"
        );

        let artifact = TrainedArtifact {
            metadata,
            input_schema,
            imputer,
            encoder,
            selected,
            scaler,
            labels,
            estimator,
        };
        Ok((artifact, report))
    }
}

fn take(x: &Array2<f64>, y: &Array1<usize>, indices: &[usize]) -> (Array2<f64>, Array1<usize>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::training::{FamilySpec, ModelFamily, ParamGrid};

    fn small_dataset(n: usize) -> Dataset {
        let mut size = Vec::with_capacity(n);
        let mut kind = Vec::with_capacity(n);
        let mut label = Vec::with_capacity(n);
        for i in 0..n {
            let class = if i % 3 == 0 { 1 } else { 0 };
            let jitter = (i as f64 * 0.61).sin();
            size.push(Some(if class == 1 { 8.0 + jitter } else { 2.0 + jitter }));
            kind.push(Some(if class == 1 { "fall" } else { "cut" }));
            label.push(Some(if class == 1 { "hospitalized" } else { "non-hospitalized" }));
        }
        Dataset::new(vec![
            Column::numeric("size", size),
            Column::categorical_from("kind", &kind),
            Column::categorical_from("degree", &label),
        ])
        .unwrap()
    }

    fn knn_registry() -> ModelRegistry {
        ModelRegistry::new().with_family(FamilySpec::new(
            ModelFamily::Knn,
            ParamGrid::new().with_axis("n_neighbors", vec![3i64]),
        ))
    }

    #[test]
    fn test_osha_preset_targets_degree_of_injury() {
        let config = PipelineConfig::osha();
        assert_eq!(config.target_column, "degree_of_inj");
        assert_eq!(config.balance_placement, BalancePlacement::TrainingOnly);
        assert_eq!(config.preprocessing.drop_columns.len(), 31);
    }

    #[test]
    fn test_config_json_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"target_column": "y", "balance_placement": "before_split"}"#).unwrap();
        assert_eq!(config.target_column, "y");
        assert_eq!(config.balance_placement, BalancePlacement::BeforeSplit);
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.registry, RegistryKind::Standard);
    }

    #[test]
    fn test_missing_target_is_schema_error() {
        let pipeline = TrainingPipeline::new(PipelineConfig::new("absent"));
        let err = pipeline.run(small_dataset(40)).unwrap_err();
        assert!(matches!(err, SeverityError::SchemaError(_)));
    }

    #[test]
    fn test_single_class_is_degenerate() {
        let dataset = Dataset::new(vec![
            Column::numeric_dense("a", (0..20).map(|i| i as f64).collect()),
            Column::categorical_from("degree", &vec![Some("minor"); 20]),
        ])
        .unwrap();
        let pipeline = TrainingPipeline::new(PipelineConfig::new("degree")).with_registry(knn_registry());
        let err = pipeline.run(dataset).unwrap_err();
        assert!(matches!(err, SeverityError::DegenerateData(_)));
    }

    #[test]
    fn test_abort_before_first_stage() {
        let handle = AbortHandle::new();
        handle.abort();
        let pipeline = TrainingPipeline::new(PipelineConfig::new("degree"))
            .with_registry(knn_registry())
            .with_abort_handle(handle);
        match pipeline.run(small_dataset(40)) {
            Err(SeverityError::Cancelled { stage }) => assert_eq!(stage, "clean"),
            other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_small_run_produces_artifact() {
        let config = PipelineConfig::new("degree").with_cv_folds(3).with_n_jobs(Some(2));
        let pipeline = TrainingPipeline::new(config).with_registry(knn_registry());
        let (artifact, report) = pipeline.run(small_dataset(80)).unwrap();

        assert_eq!(report.class_labels, vec!["hospitalized", "non-hospitalized"]);
        assert_eq!(report.selection.selected_family, "knn");
        let after: Vec<usize> = report.class_counts_after_balance.values().copied().collect();
        assert_eq!(after[0], after[1]);
        assert!(!report.selected_features.is_empty());
        assert_eq!(artifact.metadata.family, "knn");
    }

    #[test]
    fn test_unimputed_missing_numeric_cell_drops_row_not_column() {
        let mut columns = small_dataset(60).columns();
        let age = (0..60).map(|i| if i == 5 { None } else { Some(20.0 + (i % 40) as f64) }).collect();
        columns.push(Column::numeric("age", age));
        let dataset = Dataset::new(columns).unwrap();

        let config = PipelineConfig::new("degree")
            .with_preprocessing(PreprocessingConfig::new().with_impute_by_kind(false))
            .with_cv_folds(3);
        let (artifact, report) = TrainingPipeline::new(config).with_registry(knn_registry()).run(dataset).unwrap();

        assert!(report.imputed_columns.is_empty());
        assert_eq!(report.rows_after_outliers, 59);
        let age_bounds = report.outlier_bounds.iter().find(|b| b.column == "age").unwrap();
        assert_eq!(age_bounds.rows_removed, 1);
        assert!(artifact.encoder.feature_space().names().iter().any(|n| n == "age"));
    }
}
