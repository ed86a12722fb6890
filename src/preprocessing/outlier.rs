//! IQR-based outlier row filtering
//!
//! Columns are processed one after another in the configured order, and each
//! column's fence is computed on the rows that survived the previous ones.
//! A row is kept only when its value lies inside the fence, so a missing
//! cell in a filtered column drops the row.

use crate::dataset::{ColumnKind, Dataset};
use crate::error::{SeverityError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which numeric columns to filter on, and in which order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutlierColumns {
    /// Exactly these columns, in this order
    Explicit(Vec<String>),
    /// Every numeric column in dataset order, minus the excluded ones
    NumericInSchemaOrder,
    /// No outlier filtering
    Disabled,
}

impl Default for OutlierColumns {
    fn default() -> Self {
        OutlierColumns::NumericInSchemaOrder
    }
}

impl OutlierColumns {
    /// Resolve to a concrete ordered column list
    pub fn resolve<S: AsRef<str>>(&self, dataset: &Dataset, exclude: &[S]) -> Vec<String> {
        match self {
            OutlierColumns::Explicit(columns) => columns.clone(),
            OutlierColumns::NumericInSchemaOrder => dataset
                .names_of_kind(ColumnKind::Numeric)
                .into_iter()
                .filter(|name| !exclude.iter().any(|e| e.as_ref() == name))
                .collect(),
            OutlierColumns::Disabled => Vec::new(),
        }
    }
}

/// Fence applied to one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    pub column: String,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
    pub rows_removed: usize,
}

/// Sequential IQR filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFilter {
    /// Fence multiplier on the IQR
    pub factor: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self { factor: 1.5 }
    }
}

impl OutlierFilter {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// Remove rows outside the IQR fence, column by column
    pub fn filter(&self, mut dataset: Dataset, columns: &[String]) -> Result<(Dataset, Vec<OutlierBounds>)> {
        if !(self.factor.is_finite() && self.factor >= 0.0) {
            return Err(SeverityError::invalid_parameter(
                "outlier_factor",
                self.factor,
                "must be a finite non-negative number",
            ));
        }

        let rows_before = dataset.n_rows();
        let mut bounds = Vec::with_capacity(columns.len());

        for name in columns {
            let Some(column) = dataset.column(name) else {
                debug!(column = %name, "Outlier column absent, skipping");
                continue;
            };
            let values = column.as_numeric().ok_or_else(|| {
                SeverityError::SchemaError(format!(
                    "outlier filtering requested for categorical column '{}'",
                    name
                ))
            })?;

            let q1 = values.quantile(0.25, QuantileMethod::Linear)?;
            let q3 = values.quantile(0.75, QuantileMethod::Linear)?;
            let (Some(q1), Some(q3)) = (q1, q3) else {
                debug!(column = %name, "Outlier column has no observed values, skipping");
                continue;
            };
            let iqr = q3 - q1;
            let lower = q1 - self.factor * iqr;
            let upper = q3 + self.factor * iqr;

            let mask = values.gt_eq(lower) & values.lt_eq(upper);
            let rows = dataset.n_rows();
            dataset = dataset.filter(&mask)?;
            let rows_removed = rows - dataset.n_rows();

            debug!(column = %name, q1, q3, lower, upper, rows_removed, "Applied IQR fence");
            bounds.push(OutlierBounds {
                column: name.clone(),
                q1,
                q3,
                lower,
                upper,
                rows_removed,
            });
        }

        info!(
            columns = bounds.len(),
            removed = rows_before - dataset.n_rows(),
            rows = dataset.n_rows(),
            "Filtered outliers"
        );
        Ok((dataset, bounds))
    }
}
