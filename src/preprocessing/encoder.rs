//! One-hot encoding into a fixed, named feature space

use crate::dataset::{format_number, Column, ColumnKind, Dataset};
use crate::error::{SeverityError, Result};
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Category name used for missing cells
pub const MISSING_CATEGORY: &str = "nan";

/// Where a feature comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureSource {
    /// Numeric column passed through unchanged
    Numeric { column: String },
    /// Indicator of one category of a categorical column
    OneHot { column: String, category: String },
}

/// Ordered, named encoded features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpace {
    names: Vec<String>,
    sources: Vec<FeatureSource>,
}

impl FeatureSpace {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn sources(&self) -> &[FeatureSource] {
        &self.sources
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn push(&mut self, name: String, source: FeatureSource) {
        self.names.push(name);
        self.sources.push(source);
    }
}

/// Vocabulary of one categorical column, in first-observed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CategoryBlock {
    column: String,
    /// Whether the column was numeric and its values are rendered as text
    numeric_codes: bool,
    categories: Vec<String>,
    offset: usize,
}

/// One-hot encoder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoder {
    numeric_columns: Vec<String>,
    blocks: Vec<CategoryBlock>,
    feature_space: FeatureSpace,
    is_fitted: bool,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the vocabulary.
    ///
    /// Columns in `categorical` are one-hot encoded (numeric ones by their
    /// rendered values); remaining numeric columns pass through. Categorical
    /// columns not listed, and numeric columns that still hold missing
    /// values, are left out of the feature space.
    pub fn fit(&mut self, x: &Dataset, categorical: &[String]) -> Result<&mut Self> {
        let listed: HashSet<&str> = categorical.iter().map(|s| s.as_str()).collect();
        let mut numeric_columns = Vec::new();

        for column in x.columns() {
            if listed.contains(column.name()) {
                continue;
            }
            match column.kind() {
                ColumnKind::Numeric if column.missing_count() > 0 => {
                    warn!(column = column.name(), "Numeric column still has missing values, excluded from features");
                }
                ColumnKind::Numeric => numeric_columns.push(column.name().to_string()),
                ColumnKind::Categorical => {
                    warn!(column = column.name(), "Categorical column not listed for encoding, excluded from features");
                }
            }
        }

        let mut feature_space = FeatureSpace::default();
        for name in &numeric_columns {
            feature_space.push(name.clone(), FeatureSource::Numeric { column: name.clone() });
        }

        let mut blocks = Vec::with_capacity(categorical.len());
        for name in categorical {
            let column = x.require(name)?;
            let numeric_codes = column.kind() == ColumnKind::Numeric;

            let categories: Vec<String> = category_labels(&column)?
                .into_series()
                .unique_stable()?
                .str()?
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect();

            let offset = feature_space.len();
            for category in &categories {
                feature_space.push(
                    format!("{}_{}", name, category),
                    FeatureSource::OneHot {
                        column: name.clone(),
                        category: category.clone(),
                    },
                );
            }
            blocks.push(CategoryBlock {
                column: name.clone(),
                numeric_codes,
                categories,
                offset,
            });
        }

        {
            let mut unique = HashSet::new();
            if let Some(dup) = feature_space.names().iter().find(|n| !unique.insert(n.as_str())) {
                return Err(SeverityError::PreprocessingError(format!(
                    "encoded feature name '{}' is produced twice",
                    dup
                )));
            }
        }

        info!(
            numeric = numeric_columns.len(),
            categorical = blocks.len(),
            features = feature_space.len(),
            "Fitted one-hot encoder"
        );

        self.numeric_columns = numeric_columns;
        self.blocks = blocks;
        self.feature_space = feature_space;
        self.is_fitted = true;
        Ok(self)
    }

    /// Encode rows into the fitted feature space.
    /// Unseen categories produce an all-zero block.
    pub fn transform(&self, x: &Dataset) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(SeverityError::ModelNotFitted);
        }

        let n = x.n_rows();
        let mut out = Array2::zeros((n, self.feature_space.len()));

        for (j, name) in self.numeric_columns.iter().enumerate() {
            let column = x
                .column(name)
                .ok_or_else(|| SeverityError::incompatible_schema(name))?;
            let values = column.as_numeric().ok_or_else(|| {
                SeverityError::SchemaError(format!("incompatible schema: column '{}' must be numeric", name))
            })?;
            for (i, v) in values.into_iter().enumerate() {
                out[[i, j]] = v.ok_or_else(|| {
                    SeverityError::PreprocessingError(format!(
                        "missing value in numeric feature '{}' at row {}",
                        name, i
                    ))
                })?;
            }
        }

        for block in &self.blocks {
            let column = x
                .column(&block.column)
                .ok_or_else(|| SeverityError::incompatible_schema(&block.column))?;
            if block.numeric_codes != (column.kind() == ColumnKind::Numeric) {
                return Err(SeverityError::SchemaError(format!(
                    "incompatible schema: column '{}' changed kind",
                    block.column
                )));
            }
            let positions: HashMap<&str, usize> = block
                .categories
                .iter()
                .enumerate()
                .map(|(k, c)| (c.as_str(), k))
                .collect();
            let labels = category_labels(&column)?;
            for (i, category) in labels.into_iter().enumerate() {
                if let Some(&k) = category.and_then(|c| positions.get(c)) {
                    out[[i, block.offset + k]] = 1.0;
                }
            }
        }

        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Dataset, categorical: &[String]) -> Result<Array2<f64>> {
        self.fit(x, categorical)?;
        self.transform(x)
    }

    /// Recover the category of every one-hot block from an encoded row.
    /// An all-zero block decodes to `None`.
    pub fn decode_row(&self, row: ArrayView1<f64>) -> Vec<(String, Option<String>)> {
        self.blocks
            .iter()
            .map(|block| {
                let category = (0..block.categories.len())
                    .find(|&k| row[block.offset + k] > 0.5)
                    .map(|k| block.categories[k].clone());
                (block.column.clone(), category)
            })
            .collect()
    }

    pub fn feature_space(&self) -> &FeatureSpace {
        &self.feature_space
    }

    /// Input columns the feature space was built from
    pub fn input_columns(&self) -> Vec<String> {
        self.numeric_columns
            .iter()
            .cloned()
            .chain(self.blocks.iter().map(|b| b.column.clone()))
            .collect()
    }

    /// Vocabulary of a categorical column
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.blocks
            .iter()
            .find(|b| b.column == column)
            .map(|b| b.categories.as_slice())
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Category text of every row; missing cells become [`MISSING_CATEGORY`]
fn category_labels(column: &Column) -> Result<StringChunked> {
    let labels: StringChunked = match (column.as_categorical(), column.as_numeric()) {
        (Some(ca), _) => ca.into_iter().map(|v| Some(v.unwrap_or(MISSING_CATEGORY))).collect(),
        (None, Some(ca)) => ca
            .into_iter()
            .map(|v| Some(v.map_or_else(|| MISSING_CATEGORY.to_string(), format_number)))
            .collect(),
        (None, None) => {
            return Err(SeverityError::SchemaError(format!(
                "column '{}' has no readable values",
                column.name()
            )))
        }
    };
    Ok(labels.with_name(column.name().into()))
}
