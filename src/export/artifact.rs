//! The trained artifact: every fitted stage needed to score new records

use super::serializer::{self, ExportFormat};
use crate::dataset::{ColumnKind, Dataset, Record};
use crate::error::{Result, SeverityError};
use crate::preprocessing::{ClassLabels, Encoder, Imputer, Scaler, SelectedFeatureSet};
use crate::training::{Estimator, ModelMetrics, SelectionReport, TrialParams};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Descriptive header stored alongside the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub crate_version: String,
    pub created_at: DateTime<Utc>,
    pub target_column: String,
    /// Selected model family
    pub family: String,
    pub params: TrialParams,
    /// Mean cross-validated accuracy of the selected combination
    pub cv_score: f64,
    /// Hold-out metrics of the selected family
    pub test_metrics: Option<ModelMetrics>,
    pub n_training_rows: usize,
    pub n_encoded_features: usize,
    pub n_selected_features: usize,
}

impl ArtifactMetadata {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            target_column: target_column.into(),
            family: String::new(),
            params: TrialParams::new(),
            cv_score: 0.0,
            test_metrics: None,
            n_training_rows: 0,
            n_encoded_features: 0,
            n_selected_features: 0,
        }
    }

    /// Record the outcome of model selection
    pub fn with_selection(mut self, report: &SelectionReport) -> Self {
        self.family = report.selected_family.clone();
        self.params = report.selected_params.clone();
        self.cv_score = report.cv_score;
        self.test_metrics = report.test_metrics.clone();
        self
    }

    pub fn with_shape(mut self, n_training_rows: usize, n_encoded: usize, n_selected: usize) -> Self {
        self.n_training_rows = n_training_rows;
        self.n_encoded_features = n_encoded;
        self.n_selected_features = n_selected;
        self
    }
}

/// Fitted estimator plus the fitted preprocessing it was trained behind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub metadata: ArtifactMetadata,
    /// Feature columns and kinds seen after cleaning
    pub input_schema: Vec<(String, ColumnKind)>,
    pub imputer: Imputer,
    pub encoder: Encoder,
    pub selected: SelectedFeatureSet,
    pub scaler: Scaler,
    pub labels: ClassLabels,
    pub estimator: Estimator,
}

impl TrainedArtifact {
    /// Columns a record must carry to be scored
    pub fn required_columns(&self) -> Vec<String> {
        self.encoder.input_columns()
    }

    /// Predict the severity label of one record
    pub fn predict_record(&self, record: &Record) -> Result<String> {
        for column in self.required_columns() {
            if !record.contains(&column) {
                return Err(SeverityError::incompatible_schema(&column));
            }
        }
        let dataset = Dataset::from_record(record, &self.input_schema)?;
        self.predict_dataset(&dataset)?
            .pop()
            .ok_or_else(|| SeverityError::DataError("record produced no prediction".to_string()))
    }

    /// Predict a label for every row
    pub fn predict_dataset(&self, dataset: &Dataset) -> Result<Vec<String>> {
        let x = self.features(dataset)?;
        let classes = self.estimator.predict(&x)?;
        classes
            .iter()
            .map(|&c| {
                self.labels
                    .decode(c)
                    .map(str::to_string)
                    .ok_or_else(|| SeverityError::DataError(format!("class index {} has no label", c)))
            })
            .collect()
    }

    /// Class probabilities, columns in label order; None for families without them
    pub fn predict_proba_dataset(&self, dataset: &Dataset) -> Result<Option<Array2<f64>>> {
        let x = self.features(dataset)?;
        self.estimator.predict_proba(&x)
    }

    /// Run the fitted preprocessing over raw rows
    fn features(&self, dataset: &Dataset) -> Result<Array2<f64>> {
        let required = self.required_columns();
        let mut columns = Vec::with_capacity(required.len());
        for name in &required {
            let column = dataset.column(name).ok_or_else(|| SeverityError::incompatible_schema(name))?;
            columns.push(column);
        }

        let subset = self.imputer.transform(Dataset::new(columns)?)?;
        let encoded = self.encoder.transform(&subset)?;
        let selected = self.selected.select(&encoded)?;
        self.scaler.transform(&selected)
    }

    /// Persist the artifact, handing it over to storage
    pub fn save(self, path: impl AsRef<Path>, format: ExportFormat) -> Result<()> {
        serializer::write(path.as_ref(), &self.metadata, &self, format)?;
        info!(
            path = %path.as_ref().display(),
            family = %self.metadata.family,
            format = ?format,
            "Saved trained artifact"
        );
        Ok(())
    }

    /// Load and verify a saved artifact; the format is detected from the file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let (_, artifact) = serializer::read::<TrainedArtifact>(path)?;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::pipeline::{PipelineConfig, TrainingPipeline};
    use crate::training::{FamilySpec, ModelFamily, ModelRegistry, ParamGrid};

    fn trained() -> TrainedArtifact {
        let n = 90;
        let mut hours = Vec::with_capacity(n);
        let mut task = Vec::with_capacity(n);
        let mut degree = Vec::with_capacity(n);
        for i in 0..n {
            let severe = i % 3 == 0;
            let jitter = (i as f64 * 0.73).cos() * 0.5;
            hours.push(Some(if severe { 9.0 + jitter } else { 3.0 + jitter }));
            task.push(Some(if severe { "roofing" } else { "office" }));
            degree.push(Some(if severe { "fatality" } else { "minor" }));
        }
        let dataset = Dataset::new(vec![
            Column::numeric("hours", hours),
            Column::categorical_from("task", &task),
            Column::categorical_from("degree", &degree),
        ])
        .unwrap();

        let registry = ModelRegistry::new().with_family(FamilySpec::new(
            ModelFamily::DecisionTree,
            ParamGrid::new().with_axis("max_depth", vec![3i64]),
        ));
        let config = PipelineConfig::new("degree").with_cv_folds(3);
        let (artifact, _) = TrainingPipeline::new(config).with_registry(registry).run(dataset).unwrap();
        artifact
    }

    #[test]
    fn test_predict_record() {
        let artifact = trained();
        let severe = Record::new().with_numeric("hours", 9.2).with_category("task", "roofing");
        let minor = Record::new().with_numeric("hours", 2.8).with_category("task", "office");
        assert_eq!(artifact.predict_record(&severe).unwrap(), "fatality");
        assert_eq!(artifact.predict_record(&minor).unwrap(), "minor");
    }

    #[test]
    fn test_missing_column_is_incompatible_schema() {
        let artifact = trained();
        let record = Record::new().with_category("task", "roofing");
        match artifact.predict_record(&record) {
            Err(SeverityError::SchemaError(msg)) => assert!(msg.contains("incompatible schema")),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_value_is_imputed_at_inference() {
        let artifact = trained();
        let record = Record::new().with_missing("hours").with_category("task", "roofing");
        assert!(artifact.predict_record(&record).is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let artifact = trained();
        let expected = artifact.metadata.clone();
        artifact.save(&path, ExportFormat::Binary).unwrap();

        let loaded = TrainedArtifact::load(&path).unwrap();
        assert_eq!(loaded.metadata, expected);
        let record = Record::new().with_numeric("hours", 9.0).with_category("task", "roofing");
        assert_eq!(loaded.predict_record(&record).unwrap(), "fatality");
    }
}
