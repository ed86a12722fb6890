//! Typed tabular dataset
//!
//! Every column carries exactly one [`ColumnKind`], declared when the dataset
//! is built and checked there once. Pipeline stages take a [`Dataset`] by
//! value and hand back a new one, so no two stages ever share a table.

pub mod loader;

pub use loader::{from_dataframe, load_csv, SchemaSpec};

use crate::error::{Result, SeverityError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Kind of a column, fixed at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    /// Storage dtype of the kind
    pub fn dtype(self) -> DataType {
        match self {
            ColumnKind::Numeric => DataType::Float64,
            ColumnKind::Categorical => DataType::String,
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// Named column of one kind, stored as a polars series
/// (`Float64` for numeric, `String` for categorical)
#[derive(Debug, Clone)]
pub struct Column {
    kind: ColumnKind,
    series: Series,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.series.name() == other.series.name()
            && self.series.equals_missing(&other.series)
    }
}

impl Column {
    /// Numeric column. NaN cells are stored as missing.
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let ca: Float64Chunked = values.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect();
        Self {
            kind: ColumnKind::Numeric,
            series: ca.with_name(PlSmallStr::from_string(name.into())).into_series(),
        }
    }

    /// Numeric column without missing cells
    pub fn numeric_dense(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::numeric(name, values.into_iter().map(Some).collect())
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        let ca: StringChunked = values.into_iter().collect();
        Self {
            kind: ColumnKind::Categorical,
            series: ca.with_name(PlSmallStr::from_string(name.into())).into_series(),
        }
    }

    /// Categorical column from string slices
    pub fn categorical_from<S: AsRef<str>>(name: impl Into<String>, values: &[Option<S>]) -> Self {
        let ca: StringChunked = values.iter().map(|v| v.as_ref().map(|s| s.as_ref())).collect();
        Self {
            kind: ColumnKind::Categorical,
            series: ca.with_name(PlSmallStr::from_string(name.into())).into_series(),
        }
    }

    /// Wrap a series that already has the storage dtype of `kind`
    pub fn from_series(series: Series, kind: ColumnKind) -> Result<Self> {
        if series.dtype() != &kind.dtype() {
            return Err(SeverityError::SchemaError(format!(
                "column '{}' is declared {} but stored as {}",
                series.name(),
                kind,
                series.dtype()
            )));
        }
        let series = match kind {
            ColumnKind::Numeric => {
                let ca = series.f64()?;
                if ca.into_iter().any(|v| v.is_some_and(f64::is_nan)) {
                    let cleaned: Float64Chunked = ca.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect();
                    cleaned.with_name(series.name().clone()).into_series()
                } else {
                    series
                }
            }
            ColumnKind::Categorical => series,
        };
        Ok(Self { kind, series })
    }

    pub fn name(&self) -> &str {
        self.series.name().as_str()
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Numeric values, or None for a categorical column
    pub fn as_numeric(&self) -> Option<&Float64Chunked> {
        match self.kind {
            ColumnKind::Numeric => self.series.f64().ok(),
            ColumnKind::Categorical => None,
        }
    }

    /// Categorical values, or None for a numeric column
    pub fn as_categorical(&self) -> Option<&StringChunked> {
        match self.kind {
            ColumnKind::Categorical => self.series.str().ok(),
            ColumnKind::Numeric => None,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.series.null_count()
    }

    pub fn non_missing_count(&self) -> usize {
        self.len() - self.missing_count()
    }

    pub fn value(&self, row: usize) -> Value {
        let value = match self.kind {
            ColumnKind::Numeric => self.as_numeric().and_then(|ca| ca.get(row)).map(Value::Numeric),
            ColumnKind::Categorical => self
                .as_categorical()
                .and_then(|ca| ca.get(row))
                .map(|s| Value::Categorical(s.to_string())),
        };
        value.unwrap_or(Value::Missing)
    }
}

/// Ordered collection of equally long, uniquely named columns.
///
/// Backed by a polars [`DataFrame`]; `kinds[i]` is the declared kind of the
/// frame's i-th column and always matches its storage dtype.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    kinds: Vec<ColumnKind>,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.kinds == other.kinds && self.frame.equals_missing(&other.frame)
    }
}

impl Dataset {
    /// Build a dataset, validating equal column lengths and unique names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut seen = HashSet::new();

        for column in &columns {
            if !seen.insert(column.name()) {
                return Err(SeverityError::SchemaError(format!(
                    "duplicate column name '{}'",
                    column.name()
                )));
            }
            if column.len() != n_rows {
                return Err(SeverityError::SchemaError(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name(),
                    column.len(),
                    n_rows
                )));
            }
        }

        let kinds = columns.iter().map(|c| c.kind).collect();
        let frame = DataFrame::new(columns.into_iter().map(|c| c.series.into_column()).collect())?;
        Ok(Self { frame, kinds })
    }

    /// Wrap a frame whose column dtypes match `kinds`
    pub fn from_frame(frame: DataFrame, kinds: Vec<ColumnKind>) -> Result<Self> {
        if frame.width() != kinds.len() {
            return Err(SeverityError::SchemaError(format!(
                "{} column kinds declared for {} columns",
                kinds.len(),
                frame.width()
            )));
        }
        for (column, kind) in frame.get_columns().iter().zip(&kinds) {
            if column.dtype() != &kind.dtype() {
                return Err(SeverityError::SchemaError(format!(
                    "column '{}' is declared {} but stored as {}",
                    column.name(),
                    kind,
                    column.dtype()
                )));
            }
        }
        Ok(Self { frame, kinds })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    pub fn n_rows(&self) -> usize {
        if self.frame.width() == 0 {
            0
        } else {
            self.frame.height()
        }
    }

    pub fn n_cols(&self) -> usize {
        self.frame.width()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn columns(&self) -> Vec<Column> {
        self.frame
            .get_columns()
            .iter()
            .zip(&self.kinds)
            .map(|(c, &kind)| Column {
                kind,
                series: c.as_materialized_series().clone(),
            })
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.frame.get_column_names().into_iter().map(|n| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        let idx = self.frame.get_column_index(name)?;
        Some(Column {
            kind: self.kinds[idx],
            series: self.frame.get_columns()[idx].as_materialized_series().clone(),
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    /// Column lookup that fails with a schema error
    pub fn require(&self, name: &str) -> Result<Column> {
        self.column(name)
            .ok_or_else(|| SeverityError::SchemaError(format!("column '{}' not found", name)))
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.frame.get_column_index(name).map(|idx| self.kinds[idx])
    }

    /// Column names of the given kind, in dataset order
    pub fn names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .zip(&self.kinds)
            .filter(|(_, &k)| k == kind)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Remove the named columns; names that are absent are ignored
    pub fn drop_columns<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for name in names {
            let Some(idx) = self.frame.get_column_index(name.as_ref()) else {
                continue;
            };
            if self.frame.drop_in_place(name.as_ref()).is_ok() {
                self.kinds.remove(idx);
            }
        }
        self
    }

    /// Split off one column, returning it and the remaining dataset
    pub fn split_column(mut self, name: &str) -> Result<(Column, Dataset)> {
        let idx = self
            .frame
            .get_column_index(name)
            .ok_or_else(|| SeverityError::SchemaError(format!("column '{}' not found", name)))?;
        let column = self.frame.drop_in_place(name)?;
        let kind = self.kinds.remove(idx);
        let column = Column {
            kind,
            series: column.as_materialized_series().clone(),
        };
        Ok((column, self))
    }

    /// Keep rows whose mask entry is true; null entries drop the row
    pub fn filter(self, mask: &BooleanChunked) -> Result<Dataset> {
        let frame = self.frame.filter(mask)?;
        Ok(Dataset {
            frame,
            kinds: self.kinds,
        })
    }

    /// Drop rows where the named column is missing
    pub fn drop_missing(self, name: &str) -> Result<Dataset> {
        let mask = self.require(name)?.series().is_not_null();
        self.filter(&mask)
    }

    /// Remove exact duplicate rows, keeping the first occurrence.
    /// Missing cells compare equal to each other. Returns the number removed.
    pub fn dedup_rows(self) -> Result<(Dataset, usize)> {
        if self.frame.width() == 0 {
            return Ok((self, 0));
        }
        let before = self.frame.height();
        let frame = self.frame.unique_stable(None, UniqueKeepStrategy::First, None)?;
        let removed = before - frame.height();
        Ok((
            Dataset {
                frame,
                kinds: self.kinds,
            },
            removed,
        ))
    }

    /// Row view as a record
    pub fn record(&self, row: usize) -> Record {
        let mut record = Record::new();
        for column in self.columns() {
            record.insert(column.name(), column.value(row));
        }
        record
    }

    /// Build a single-row dataset from a record, using `schema` for column order and kinds.
    /// Columns absent from the record are absent from the result.
    pub fn from_record(record: &Record, schema: &[(String, ColumnKind)]) -> Result<Dataset> {
        let mut columns = Vec::with_capacity(schema.len());
        for (name, kind) in schema {
            let Some(value) = record.get(name) else {
                continue;
            };
            let column = match (kind, value) {
                (ColumnKind::Numeric, Value::Numeric(x)) => Column::numeric(name.clone(), vec![Some(*x)]),
                (ColumnKind::Numeric, Value::Missing) => Column::numeric(name.clone(), vec![None]),
                (ColumnKind::Categorical, Value::Categorical(s)) => {
                    Column::categorical(name.clone(), vec![Some(s.clone())])
                }
                (ColumnKind::Categorical, Value::Missing) => Column::categorical(name.clone(), vec![None]),
                (ColumnKind::Categorical, Value::Numeric(x)) => {
                    Column::categorical(name.clone(), vec![Some(format_number(*x))])
                }
                (ColumnKind::Numeric, Value::Categorical(s)) => {
                    let parsed = s.trim().parse::<f64>().map_err(|_| {
                        SeverityError::SchemaError(format!(
                            "column '{}' is numeric but record holds '{}'",
                            name, s
                        ))
                    })?;
                    Column::numeric(name.clone(), vec![Some(parsed)])
                }
            };
            columns.push(column);
        }
        Dataset::new(columns)
    }

    /// Column names and kinds, in order
    pub fn schema(&self) -> Vec<(String, ColumnKind)> {
        self.frame
            .get_column_names()
            .into_iter()
            .zip(&self.kinds)
            .map(|(name, &kind)| (name.to_string(), kind))
            .collect()
    }
}

/// Canonical text form of a numeric value ("1" for 1.0)
pub fn format_number(x: f64) -> String {
    format!("{}", x)
}

/// A single incident, column name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn with_numeric(mut self, name: impl Into<String>, value: f64) -> Self {
        let value = if value.is_nan() { Value::Missing } else { Value::Numeric(value) };
        self.insert(name, value);
        self
    }

    pub fn with_category(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, Value::Categorical(value.into()));
        self
    }

    pub fn with_missing(mut self, name: impl Into<String>) -> Self {
        self.insert(name, Value::Missing);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
