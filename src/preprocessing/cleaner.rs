//! Column and row cleaning
//!
//! Drops configured columns, removes columns with too few non-missing values
//! and deduplicates rows.

use crate::dataset::Dataset;
use crate::error::{SeverityError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Minimum fill a column needs to survive cleaning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FillThreshold {
    /// At least this many non-missing values
    MinCount(usize),
    /// At least this fraction of rows non-missing (0.0..=1.0)
    MinFraction(f64),
}

impl Default for FillThreshold {
    fn default() -> Self {
        FillThreshold::MinFraction(0.0)
    }
}

impl FillThreshold {
    fn required(&self, n_rows: usize) -> usize {
        match *self {
            FillThreshold::MinCount(n) => n,
            FillThreshold::MinFraction(f) => (f * n_rows as f64).ceil() as usize,
        }
    }
}

/// What a cleaning pass removed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub dropped_columns: Vec<String>,
    pub low_fill_columns: Vec<String>,
    pub duplicates_removed: usize,
}

/// Cleaner configuration and entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cleaner {
    /// Columns removed unconditionally; absent names are ignored
    pub drop_columns: Vec<String>,
    pub fill_threshold: FillThreshold,
    /// Columns never removed by the fill threshold (the target, typically)
    pub protected: Vec<String>,
}

impl Cleaner {
    pub fn new(drop_columns: Vec<String>, fill_threshold: FillThreshold) -> Self {
        Self {
            drop_columns,
            fill_threshold,
            protected: Vec::new(),
        }
    }

    pub fn with_protected(mut self, columns: Vec<String>) -> Self {
        self.protected = columns;
        self
    }

    /// Run the cleaning pass
    pub fn clean(&self, dataset: Dataset) -> Result<(Dataset, CleaningReport)> {
        if let FillThreshold::MinFraction(f) = self.fill_threshold {
            if !(0.0..=1.0).contains(&f) {
                return Err(SeverityError::invalid_parameter(
                    "fill_threshold",
                    f,
                    "fraction must lie in [0, 1]",
                ));
            }
        }

        let mut report = CleaningReport::default();

        report.dropped_columns = self
            .drop_columns
            .iter()
            .filter(|name| dataset.has_column(name))
            .cloned()
            .collect();
        let dataset = dataset.drop_columns(&self.drop_columns);

        let required = self.fill_threshold.required(dataset.n_rows());
        report.low_fill_columns = dataset
            .frame()
            .get_columns()
            .iter()
            .filter(|c| !self.protected.iter().any(|p| p == c.name().as_str()))
            .filter(|c| c.len() - c.null_count() < required)
            .map(|c| c.name().to_string())
            .collect();
        for name in &report.low_fill_columns {
            debug!(column = %name, required, "Dropping low-fill column");
        }
        let dataset = dataset.drop_columns(&report.low_fill_columns);

        let (dataset, removed) = dataset.dedup_rows()?;
        report.duplicates_removed = removed;

        info!(
            dropped = report.dropped_columns.len(),
            low_fill = report.low_fill_columns.len(),
            duplicates = removed,
            rows = dataset.n_rows(),
            cols = dataset.n_cols(),
            "Cleaned dataset"
        );

        Ok((dataset, report))
    }
}
