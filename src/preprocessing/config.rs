//! Preprocessing configuration

use super::{FillThreshold, ImputationPlan, ImputeStrategy, OutlierColumns};
use serde::{Deserialize, Serialize};

/// Configuration for the cleaning, imputation, outlier, encoding and
/// feature-selection stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Columns removed before anything else (absent names are ignored)
    pub drop_columns: Vec<String>,

    /// Columns below this fill are removed
    pub fill_threshold: FillThreshold,

    /// Explicit per-column imputation strategies
    pub imputation: ImputationPlan,

    /// Also impute every unlisted column by kind
    /// (median for numeric, most frequent for categorical)
    pub impute_by_kind: bool,

    /// Columns the IQR filter runs over, in order
    pub outlier_columns: OutlierColumns,

    /// IQR fence multiplier
    pub outlier_factor: f64,

    /// Columns to one-hot encode; None means every categorical feature column
    pub categorical_columns: Option<Vec<String>>,

    /// Importance a feature must exceed to be selected
    pub importance_threshold: f64,

    /// Trees in the importance-scoring forest
    pub importance_estimators: usize,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            drop_columns: Vec::new(),
            fill_threshold: FillThreshold::default(),
            imputation: ImputationPlan::new(),
            impute_by_kind: true,
            outlier_columns: OutlierColumns::NumericInSchemaOrder,
            outlier_factor: 1.5,
            categorical_columns: None,
            importance_threshold: 0.01,
            importance_estimators: 100,
        }
    }
}

impl PreprocessingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings of the OSHA degree-of-injury study: its identifier and
    /// free-text drop list, a 15 000-value fill threshold, and the three
    /// explicit imputations.
    pub fn osha() -> Self {
        let drop_columns = [
            "state_flag", "health_const", "nr_in_estab", "reporting_id", "health_marit", "migrant",
            "report_id", "abstract_text", "fall_distance", "event_date", "event_time", "summary_nr",
            "injury_line_nr", "occ_code", "naics_code", "adv_notice", "state_flag.1", "site_zip",
            "mail_street", "mail_city", "open_date", "case_mod_date", "close_conf_date", "sic_code",
            "host_est_key", "site_address", "mail_zip", "owner_code", "nonbuild_ht", "close_case_date",
            "ld_dt",
        ];

        Self {
            drop_columns: drop_columns.iter().map(|s| s.to_string()).collect(),
            fill_threshold: FillThreshold::MinCount(15_000),
            imputation: ImputationPlan::new()
                .with("degree_of_inj", ImputeStrategy::Median)
                .with("sex", ImputeStrategy::MostFrequent)
                .with("union_status", ImputeStrategy::MostFrequent),
            impute_by_kind: false,
            ..Self::default()
        }
    }

    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn with_fill_threshold(mut self, threshold: FillThreshold) -> Self {
        self.fill_threshold = threshold;
        self
    }

    /// Builder method to set the imputation plan
    pub fn with_imputation(mut self, plan: ImputationPlan) -> Self {
        self.imputation = plan;
        self
    }

    pub fn with_impute_by_kind(mut self, enabled: bool) -> Self {
        self.impute_by_kind = enabled;
        self
    }

    pub fn with_outlier_columns(mut self, columns: OutlierColumns) -> Self {
        self.outlier_columns = columns;
        self
    }

    pub fn with_outlier_factor(mut self, factor: f64) -> Self {
        self.outlier_factor = factor;
        self
    }

    pub fn with_categorical_columns(mut self, columns: Vec<String>) -> Self {
        self.categorical_columns = Some(columns);
        self
    }

    pub fn with_importance_threshold(mut self, threshold: f64) -> Self {
        self.importance_threshold = threshold;
        self
    }

    pub fn with_importance_estimators(mut self, n: usize) -> Self {
        self.importance_estimators = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osha_preset() {
        let config = PreprocessingConfig::osha();
        assert_eq!(config.drop_columns.len(), 31);
        assert_eq!(config.fill_threshold, FillThreshold::MinCount(15_000));
        assert_eq!(config.imputation.strategies.len(), 3);
        assert!(!config.impute_by_kind);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PreprocessingConfig = serde_json::from_str(r#"{"outlier_factor": 3.0}"#).unwrap();
        assert_eq!(config.outlier_factor, 3.0);
        assert_eq!(config.importance_threshold, 0.01);
        assert!(config.impute_by_kind);
    }
}
