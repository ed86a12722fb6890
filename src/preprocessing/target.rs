//! Target vocabulary: severity levels to class indices

use crate::dataset::{format_number, Column, Value};
use crate::error::{SeverityError, Result};
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sorted class labels of the target column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    /// Collect the distinct non-missing levels. Numeric targets sort by
    /// value, categorical ones lexicographically.
    pub fn fit(column: &Column) -> Result<Self> {
        let labels: Vec<String> = match (column.as_numeric(), column.as_categorical()) {
            (Some(ca), _) => ca.unique()?.sort(false).into_iter().flatten().map(format_number).collect(),
            (None, Some(ca)) => ca
                .unique()?
                .sort(false)
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect(),
            (None, None) => Vec::new(),
        };

        if labels.is_empty() {
            return Err(SeverityError::DegenerateData(format!(
                "target column '{}' has no observed values",
                column.name()
            )));
        }
        Ok(Self { labels })
    }

    /// Class index per row; missing or unknown levels are errors
    pub fn encode(&self, column: &Column) -> Result<Array1<usize>> {
        let index: HashMap<&str, usize> = self.labels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let mut out = Vec::with_capacity(column.len());
        for row in 0..column.len() {
            let label = match column.value(row) {
                Value::Numeric(x) => format_number(x),
                Value::Categorical(s) => s,
                Value::Missing => {
                    return Err(SeverityError::DegenerateData(format!(
                        "target column '{}' is missing at row {}",
                        column.name(),
                        row
                    )))
                }
            };
            let idx = index.get(label.as_str()).copied().ok_or_else(|| {
                SeverityError::SchemaError(format!("unknown target level '{}'", label))
            })?;
            out.push(idx);
        }
        Ok(Array1::from_vec(out))
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn decode(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(|s| s.as_str())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_levels_sorted_by_value() {
        let col = Column::numeric("degree_of_inj", vec![Some(10.0), Some(2.0), None, Some(1.0), Some(2.0)]);
        let labels = ClassLabels::fit(&col).unwrap();
        assert_eq!(labels.labels(), &["1", "2", "10"]);
    }

    #[test]
    fn test_encode_rejects_missing() {
        let col = Column::numeric("degree_of_inj", vec![Some(1.0), None]);
        let labels = ClassLabels::fit(&col).unwrap();
        assert!(labels.encode(&col).is_err());
    }

    #[test]
    fn test_encode_decode() {
        let col = Column::categorical_from("severity", &[Some("hospitalized"), Some("fatal"), Some("fatal")]);
        let labels = ClassLabels::fit(&col).unwrap();
        let y = labels.encode(&col).unwrap();
        assert_eq!(y.to_vec(), vec![1, 0, 0]);
        assert_eq!(labels.decode(1), Some("hospitalized"));
    }
}
