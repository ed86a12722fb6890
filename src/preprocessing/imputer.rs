//! Missing value imputation
//!
//! Every column gets its strategy explicitly through an [`ImputationPlan`];
//! columns outside the plan are left as they are.

use crate::dataset::{Column, ColumnKind, Dataset};
use crate::error::{SeverityError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Strategy for filling a column's missing cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Median of the non-missing values (numeric columns only)
    Median,
    /// Most frequent non-missing value; ties go to the value seen first
    MostFrequent,
    /// Fixed fill value
    Constant(FillValue),
}

/// A fitted fill value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillValue {
    Numeric(f64),
    Categorical(String),
}

impl FillValue {
    fn kind(&self) -> ColumnKind {
        match self {
            FillValue::Numeric(_) => ColumnKind::Numeric,
            FillValue::Categorical(_) => ColumnKind::Categorical,
        }
    }

    fn fill_expr(&self, column: &str) -> Expr {
        match self {
            FillValue::Numeric(x) => col(column).fill_null(lit(*x)),
            FillValue::Categorical(s) => col(column).fill_null(lit(s.as_str())),
        }
    }
}

/// Explicit column to strategy assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationPlan {
    pub strategies: BTreeMap<String, ImputeStrategy>,
}

impl ImputationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, strategy: ImputeStrategy) -> Self {
        self.strategies.insert(column.into(), strategy);
        self
    }

    /// Median for every numeric column, most-frequent for every categorical one
    pub fn by_kind<S: AsRef<str>>(dataset: &Dataset, exclude: &[S]) -> Self {
        let strategies = dataset
            .schema()
            .into_iter()
            .filter(|(name, _)| !exclude.iter().any(|e| e.as_ref() == name))
            .map(|(name, kind)| {
                let strategy = match kind {
                    ColumnKind::Numeric => ImputeStrategy::Median,
                    ColumnKind::Categorical => ImputeStrategy::MostFrequent,
                };
                (name, strategy)
            })
            .collect();
        Self { strategies }
    }

    /// Copy of the plan with strategies for `columns` added where none exist yet
    pub fn extended_by_kind<S: AsRef<str>>(&self, dataset: &Dataset, exclude: &[S]) -> Self {
        let mut plan = Self::by_kind(dataset, exclude);
        for (name, strategy) in &self.strategies {
            plan.strategies.insert(name.clone(), strategy.clone());
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Fitted imputer: one fill value per imputed column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    fills: BTreeMap<String, FillValue>,
    is_fitted: bool,
}

impl Imputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute fill values for every planned column present in the dataset
    pub fn fit(&mut self, dataset: &Dataset, plan: &ImputationPlan) -> Result<&mut Self> {
        self.fills.clear();

        for (name, strategy) in &plan.strategies {
            let Some(column) = dataset.column(name) else {
                debug!(column = %name, "Imputation target absent, skipping");
                continue;
            };

            let fill = match (strategy, column.kind()) {
                (ImputeStrategy::Median, ColumnKind::Numeric) => {
                    let median = column.as_numeric().and_then(|ca| ca.median());
                    Some(FillValue::Numeric(median.unwrap_or(0.0)))
                }
                (ImputeStrategy::Median, ColumnKind::Categorical) => {
                    return Err(SeverityError::SchemaError(format!(
                        "median imputation requested for categorical column '{}'",
                        name
                    )));
                }
                (ImputeStrategy::MostFrequent, _) => most_frequent(&column)?,
                (ImputeStrategy::Constant(value), kind) => {
                    if value.kind() != kind {
                        return Err(SeverityError::SchemaError(format!(
                            "constant fill for '{}' is {} but the column is {}",
                            name,
                            value.kind(),
                            kind
                        )));
                    }
                    Some(value.clone())
                }
            };

            match fill {
                Some(fill) => {
                    self.fills.insert(name.clone(), fill);
                }
                None => warn!(column = %name, "Column has no observed values, left unimputed"),
            }
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Fill missing cells of every fitted column present in the dataset
    pub fn transform(&self, dataset: Dataset) -> Result<Dataset> {
        if !self.is_fitted {
            return Err(SeverityError::ModelNotFitted);
        }

        let mut fills = Vec::with_capacity(self.fills.len());
        for (name, fill) in &self.fills {
            let Some(kind) = dataset.kind_of(name) else {
                continue;
            };
            if kind != fill.kind() {
                return Err(SeverityError::SchemaError(format!(
                    "column '{}' is {} but was imputed as {}",
                    name,
                    kind,
                    fill.kind()
                )));
            }
            fills.push(fill.fill_expr(name));
        }
        if fills.is_empty() {
            return Ok(dataset);
        }

        let kinds = dataset.kinds().to_vec();
        let frame = dataset.into_frame().lazy().with_columns(fills).collect()?;
        Dataset::from_frame(frame, kinds)
    }

    pub fn fit_transform(&mut self, dataset: Dataset, plan: &ImputationPlan) -> Result<Dataset> {
        self.fit(&dataset, plan)?;
        self.transform(dataset)
    }

    pub fn fill_value(&self, column: &str) -> Option<&FillValue> {
        self.fills.get(column)
    }

    pub fn fills(&self) -> &BTreeMap<String, FillValue> {
        &self.fills
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Most frequent non-missing value; ties go to the value observed first
fn most_frequent(column: &Column) -> Result<Option<FillValue>> {
    let name = column.name();
    let counts = column
        .series()
        .drop_nulls()
        .into_frame()
        .lazy()
        .group_by_stable([col(name)])
        .agg([len().alias("__count")])
        .collect()?;

    let count = counts.column("__count")?.as_materialized_series().cast(&DataType::UInt64)?;
    let mut best: Option<(usize, u64)> = None;
    for (idx, c) in count.u64()?.into_iter().enumerate() {
        let c = c.unwrap_or(0);
        if best.map_or(true, |(_, b)| c > b) {
            best = Some((idx, c));
        }
    }
    let Some((idx, _)) = best else {
        return Ok(None);
    };

    let values = counts.column(name)?.as_materialized_series();
    let fill = match column.kind() {
        ColumnKind::Numeric => values.f64()?.get(idx).map(FillValue::Numeric),
        ColumnKind::Categorical => values.str()?.get(idx).map(|s| FillValue::Categorical(s.to_string())),
    };
    Ok(fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn sample() -> Dataset {
        Dataset::new(vec![
            Column::numeric("age", vec![Some(20.0), None, Some(40.0), Some(30.0), None]),
            Column::numeric("empty", vec![None, None, None, None, None]),
            Column::categorical_from("sex", &[Some("F"), Some("M"), None, Some("M"), Some("F")]),
            Column::categorical_from("union_status", &[None, Some("Y"), Some("N"), None, Some("N")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_median_and_all_missing() {
        let plan = ImputationPlan::new()
            .with("age", ImputeStrategy::Median)
            .with("empty", ImputeStrategy::Median);
        let mut imputer = Imputer::new();
        let ds = imputer.fit_transform(sample(), &plan).unwrap();

        assert_eq!(ds.column("age").unwrap().missing_count(), 0);
        assert_eq!(ds.column("age").unwrap().as_numeric().unwrap().get(1), Some(30.0));
        let empty = ds.column("empty").unwrap();
        assert!(empty.as_numeric().unwrap().into_iter().all(|v| v == Some(0.0)));
    }

    #[test]
    fn test_most_frequent_tie_goes_to_first_seen() {
        let plan = ImputationPlan::new().with("sex", ImputeStrategy::MostFrequent);
        let mut imputer = Imputer::new();
        imputer.fit(&sample(), &plan).unwrap();
        // F and M both appear twice; F is seen first
        assert_eq!(
            imputer.fill_value("sex"),
            Some(&FillValue::Categorical("F".to_string()))
        );
    }

    #[test]
    fn test_unplanned_columns_untouched() {
        let plan = ImputationPlan::new().with("sex", ImputeStrategy::MostFrequent);
        let mut imputer = Imputer::new();
        let ds = imputer.fit_transform(sample(), &plan).unwrap();
        assert_eq!(ds.column("union_status").unwrap().missing_count(), 2);
        assert_eq!(ds.column("age").unwrap().missing_count(), 2);
    }

    #[test]
    fn test_median_on_categorical_is_schema_error() {
        let plan = ImputationPlan::new().with("sex", ImputeStrategy::Median);
        let result = Imputer::new().fit(&sample(), &plan).map(|_| ());
        assert!(matches!(result, Err(SeverityError::SchemaError(_))));
    }

    #[test]
    fn test_constant_fill() {
        let plan = ImputationPlan::new().with(
            "union_status",
            ImputeStrategy::Constant(FillValue::Categorical("no".to_string())),
        );
        let mut imputer = Imputer::new();
        let ds = imputer.fit_transform(sample(), &plan).unwrap();
        let column = ds.column("union_status").unwrap();
        assert_eq!(column.as_categorical().unwrap().get(0), Some("no"));
        assert_eq!(column.missing_count(), 0);
    }

    #[test]
    fn test_most_frequent_numeric() {
        let ds = Dataset::new(vec![Column::numeric("shift", vec![Some(2.0), Some(3.0), None, Some(3.0)])]).unwrap();
        let plan = ImputationPlan::new().with("shift", ImputeStrategy::MostFrequent);
        let ds = Imputer::new().fit_transform(ds, &plan).unwrap();
        assert_eq!(ds.column("shift").unwrap().as_numeric().unwrap().get(2), Some(3.0));
    }

    #[test]
    fn test_by_kind_excludes_target() {
        let plan = ImputationPlan::by_kind(&sample(), &["age"]);
        assert!(!plan.strategies.contains_key("age"));
        assert_eq!(plan.strategies.get("sex"), Some(&ImputeStrategy::MostFrequent));
        assert_eq!(plan.strategies.get("empty"), Some(&ImputeStrategy::Median));
    }
}
