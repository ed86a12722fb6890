//! CSV ingestion through polars
//!
//! Column kinds are decided here, once: polars' inferred numeric dtypes map to
//! [`ColumnKind::Numeric`], everything else to [`ColumnKind::Categorical`],
//! and a [`SchemaSpec`] may override either way.

use super::{Column, ColumnKind, Dataset};
use crate::error::{SeverityError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Explicit kind overrides applied at ingestion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSpec {
    /// Columns forced to categorical (e.g. numeric codes such as `nature_of_inj`)
    pub categorical: BTreeSet<String>,
    /// Columns forced to numeric; ingestion fails if a value does not parse
    pub numeric: BTreeSet<String>,
    /// Rows polars inspects to infer dtypes
    pub infer_schema_length: Option<usize>,
}

impl SchemaSpec {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(10_000),
            ..Default::default()
        }
    }

    pub fn with_categorical<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categorical.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_numeric<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric.extend(columns.into_iter().map(Into::into));
        self
    }

    fn kind_for(&self, name: &str, dtype: &DataType) -> ColumnKind {
        if self.categorical.contains(name) {
            return ColumnKind::Categorical;
        }
        if self.numeric.contains(name) {
            return ColumnKind::Numeric;
        }
        match dtype {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 |
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 |
            DataType::Float32 | DataType::Float64 => ColumnKind::Numeric,
            _ => ColumnKind::Categorical,
        }
    }
}

/// Read a CSV file into a typed dataset
pub fn load_csv(path: impl AsRef<Path>, schema: &SchemaSpec) -> Result<Dataset> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_infer_schema_length(schema.infer_schema_length.or(Some(10_000)))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    info!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
    from_dataframe(&df, schema)
}

/// Cast a polars frame to the storage dtypes of its declared kinds
pub fn from_dataframe(df: &DataFrame, schema: &SchemaSpec) -> Result<Dataset> {
    let mut columns = Vec::with_capacity(df.width());

    for col in df.get_columns() {
        let name = col.name().to_string();
        let series = col.as_materialized_series();
        let kind = schema.kind_for(&name, series.dtype());

        let casted = if kind == ColumnKind::Numeric && schema.numeric.contains(&name) {
            series.strict_cast(&kind.dtype()).map_err(|e| {
                SeverityError::SchemaError(format!(
                    "column '{}' declared numeric but cannot be parsed: {}",
                    name, e
                ))
            })?
        } else {
            series.cast(&kind.dtype())?
        };
        let column = Column::from_series(casted, kind)?;
        debug!(column = column.name(), kind = %column.kind(), "Ingested column");
        columns.push(column);
    }

    Dataset::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_csv_kinds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "age,sex,nature_of_inj,degree_of_inj").unwrap();
        writeln!(file, "34,M,12,1").unwrap();
        writeln!(file, ",F,7,2").unwrap();
        writeln!(file, "51,,12,").unwrap();
        file.flush().unwrap();

        let schema = SchemaSpec::new().with_categorical(["nature_of_inj"]);
        let ds = load_csv(file.path(), &schema).unwrap();

        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.kind_of("age"), Some(ColumnKind::Numeric));
        assert_eq!(ds.kind_of("sex"), Some(ColumnKind::Categorical));
        assert_eq!(ds.kind_of("nature_of_inj"), Some(ColumnKind::Categorical));
        assert_eq!(ds.column("age").unwrap().missing_count(), 1);
        assert_eq!(ds.column("sex").unwrap().missing_count(), 1);
        assert_eq!(ds.column("degree_of_inj").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_dataframe_round_trip() {
        let ds = Dataset::new(vec![
            Column::numeric("x", vec![Some(1.5), None]),
            Column::categorical_from("c", &[Some("a"), None]),
        ])
        .unwrap();
        assert_eq!(ds.frame().height(), 2);
        let back = from_dataframe(ds.frame(), &SchemaSpec::new()).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_integer_codes_forced_categorical() {
        let df = df!("nature_of_inj" => [12i64, 7, 12], "age" => [30i64, 41, 52]).unwrap();
        let ds = from_dataframe(&df, &SchemaSpec::new().with_categorical(["nature_of_inj"])).unwrap();
        assert_eq!(ds.kind_of("nature_of_inj"), Some(ColumnKind::Categorical));
        assert_eq!(ds.column("nature_of_inj").unwrap().value(1), crate::dataset::Value::Categorical("7".to_string()));
        assert_eq!(ds.column("age").unwrap().as_numeric().unwrap().get(2), Some(52.0));
    }
}
