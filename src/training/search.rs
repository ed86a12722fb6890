//! Hyperparameter grids and the model family registry

use super::decision_tree::{Criterion, DecisionTree};
use super::knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
use super::linear_models::LogisticRegression;
use super::models::Estimator;
use super::random_forest::{MaxFeatures, RandomForest};
use super::svm::{KernelType, SVMClassifier, SVMConfig};
use crate::error::{SeverityError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    String(String),
    /// Explicit "unset", e.g. an unbounded `max_depth`
    Null,
}

impl ParameterValue {
    /// Get as float (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::String(s) => write!(f, "{}", s),
            ParameterValue::Null => write!(f, "None"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl<T: Into<ParameterValue>> From<Option<T>> for ParameterValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParameterValue::Null)
    }
}

/// One concrete hyperparameter combination, in declared axis order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialParams {
    values: Vec<(String, ParameterValue)>,
}

impl TrialParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing an existing entry of the same name
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `self` overlaid on `base`; `self` wins on conflicts
    pub fn merged_over(&self, base: &TrialParams) -> TrialParams {
        let mut out = base.clone();
        for (n, v) in &self.values {
            out.set(n.clone(), v.clone());
        }
        out
    }

    fn float(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_float()
                .ok_or_else(|| SeverityError::invalid_parameter(name, v, "expected a number")),
        }
    }

    fn count(&self, name: &str, default: usize) -> Result<usize> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_int()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| SeverityError::invalid_parameter(name, v, "expected a non-negative integer")),
        }
    }

    fn optional_count(&self, name: &str) -> Result<Option<usize>> {
        match self.get(name) {
            None | Some(ParameterValue::Null) => Ok(None),
            Some(_) => self.count(name, 0).map(Some),
        }
    }

    fn text<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_str()
                .ok_or_else(|| SeverityError::invalid_parameter(name, v, "expected a string")),
        }
    }

    /// Reject any parameter the family does not understand
    fn ensure_known(&self, family: ModelFamily, known: &[&str]) -> Result<()> {
        match self.values.iter().find(|(n, _)| !known.contains(&n.as_str())) {
            Some((n, v)) => Err(SeverityError::invalid_parameter(
                n.clone(),
                v,
                format!("not a {} hyperparameter", family.name()),
            )),
            None => Ok(()),
        }
    }
}

impl fmt::Display for TrialParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(n, v)| format!("{}={}", n, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Cartesian grid of hyperparameter axes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<ParameterValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis; axes keep their declared order
    pub fn with_axis<V: Into<ParameterValue>>(mut self, name: impl Into<String>, values: Vec<V>) -> Self {
        self.axes.push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn n_combinations(&self) -> usize {
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    /// Every combination, last axis varying fastest. An empty grid yields a
    /// single empty combination.
    pub fn combinations(&self) -> Vec<TrialParams> {
        let mut combos = vec![TrialParams::new()];
        for (name, values) in &self.axes {
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| prefix.clone().with(name.clone(), v.clone()))
                })
                .collect();
        }
        combos
    }
}

/// Classifier families known to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    LogisticRegression,
    DecisionTree,
    RandomForest,
    Svm,
    Knn,
}

impl ModelFamily {
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::Svm => "svm",
            ModelFamily::Knn => "knn",
        }
    }

    /// Build an unfitted estimator from one hyperparameter combination
    pub fn build(&self, params: &TrialParams, seed: u64) -> Result<Estimator> {
        match self {
            ModelFamily::LogisticRegression => {
                params.ensure_known(*self, &["C", "max_iter", "tol"])?;
                let model = LogisticRegression::new()
                    .with_c(params.float("C", 1.0)?)
                    .with_max_iter(params.count("max_iter", 1000)?)
                    .with_tol(params.float("tol", 1e-4)?);
                Ok(Estimator::LogisticRegression(model))
            }
            ModelFamily::DecisionTree => {
                params.ensure_known(*self, &["max_depth", "min_samples_split", "min_samples_leaf", "criterion"])?;
                let model = DecisionTree::new()
                    .with_max_depth(params.optional_count("max_depth")?)
                    .with_min_samples_split(params.count("min_samples_split", 2)?)
                    .with_min_samples_leaf(params.count("min_samples_leaf", 1)?)
                    .with_criterion(parse_criterion(params.text("criterion", "gini")?)?)
                    .with_random_state(seed);
                Ok(Estimator::DecisionTree(model))
            }
            ModelFamily::RandomForest => {
                params.ensure_known(
                    *self,
                    &["n_estimators", "max_depth", "min_samples_split", "min_samples_leaf", "max_features"],
                )?;
                let mut model = RandomForest::new(params.count("n_estimators", 100)?)
                    .with_max_depth(params.optional_count("max_depth")?)
                    .with_min_samples_split(params.count("min_samples_split", 2)?)
                    .with_max_features(parse_max_features(params.text("max_features", "sqrt")?)?)
                    .with_random_state(seed);
                model.min_samples_leaf = params.count("min_samples_leaf", 1)?;
                Ok(Estimator::RandomForest(model))
            }
            ModelFamily::Svm => {
                params.ensure_known(*self, &["C", "kernel", "gamma", "max_iter", "max_train_samples"])?;
                let defaults = SVMConfig::default();
                let kernel = match params.text("kernel", "rbf")? {
                    "linear" => KernelType::Linear,
                    "rbf" => KernelType::Rbf {
                        gamma: match params.get("gamma") {
                            None | Some(ParameterValue::Null) => None,
                            Some(_) => Some(params.float("gamma", 1.0)?),
                        },
                    },
                    other => return Err(SeverityError::invalid_parameter("kernel", other, "expected linear or rbf")),
                };
                let config = SVMConfig {
                    c: params.float("C", defaults.c)?,
                    kernel,
                    max_iter: params.count("max_iter", defaults.max_iter)?,
                    max_train_samples: params.count("max_train_samples", defaults.max_train_samples)?,
                    random_state: seed,
                    ..defaults
                };
                Ok(Estimator::SupportVector(SVMClassifier::new(config)))
            }
            ModelFamily::Knn => {
                params.ensure_known(*self, &["n_neighbors", "weights", "metric"])?;
                let weights = match params.text("weights", "uniform")? {
                    "uniform" => WeightScheme::Uniform,
                    "distance" => WeightScheme::Distance,
                    other => {
                        return Err(SeverityError::invalid_parameter("weights", other, "expected uniform or distance"))
                    }
                };
                let metric = match params.text("metric", "euclidean")? {
                    "euclidean" => DistanceMetric::Euclidean,
                    "manhattan" => DistanceMetric::Manhattan,
                    other => {
                        return Err(SeverityError::invalid_parameter("metric", other, "expected euclidean or manhattan"))
                    }
                };
                Ok(Estimator::KNearestNeighbors(KNNClassifier::new(KNNConfig {
                    n_neighbors: params.count("n_neighbors", 5)?,
                    metric,
                    weights,
                })))
            }
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_criterion(s: &str) -> Result<Criterion> {
    match s {
        "gini" => Ok(Criterion::Gini),
        "entropy" => Ok(Criterion::Entropy),
        other => Err(SeverityError::invalid_parameter("criterion", other, "expected gini or entropy")),
    }
}

fn parse_max_features(s: &str) -> Result<MaxFeatures> {
    match s {
        "sqrt" => Ok(MaxFeatures::Sqrt),
        "log2" => Ok(MaxFeatures::Log2),
        "all" => Ok(MaxFeatures::All),
        other => Err(SeverityError::invalid_parameter("max_features", other, "expected sqrt, log2 or all")),
    }
}

/// A family, its search grid, and fixed settings applied under every combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySpec {
    pub family: ModelFamily,
    pub grid: ParamGrid,
    pub fixed: TrialParams,
}

impl FamilySpec {
    pub fn new(family: ModelFamily, grid: ParamGrid) -> Self {
        Self {
            family,
            grid,
            fixed: TrialParams::new(),
        }
    }

    pub fn with_fixed(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.fixed.set(name, value);
        self
    }

    /// Grid combinations with the fixed settings underneath
    pub fn combinations(&self) -> Vec<TrialParams> {
        self.grid
            .combinations()
            .iter()
            .map(|combo| combo.merged_over(&self.fixed))
            .collect()
    }
}

/// Which built-in registry to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    #[default]
    Standard,
    Quick,
}

/// Ordered list of families to tune; order breaks selection ties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    families: Vec<FamilySpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self { families: Vec::new() }
    }

    pub fn with_family(mut self, spec: FamilySpec) -> Self {
        self.families.push(spec);
        self
    }

    pub fn from_kind(kind: RegistryKind) -> Self {
        match kind {
            RegistryKind::Standard => Self::standard(),
            RegistryKind::Quick => Self::quick(),
        }
    }

    /// Full grids
    pub fn standard() -> Self {
        Self::new()
            .with_family(FamilySpec::new(
                ModelFamily::LogisticRegression,
                ParamGrid::new().with_axis("C", vec![0.001, 0.01, 0.1, 1.0, 10.0]),
            ))
            .with_family(FamilySpec::new(
                ModelFamily::DecisionTree,
                ParamGrid::new()
                    .with_axis("max_depth", vec![None, Some(10i64), Some(20)])
                    .with_axis("min_samples_split", vec![2i64, 5, 10]),
            ))
            .with_family(FamilySpec::new(
                ModelFamily::RandomForest,
                ParamGrid::new()
                    .with_axis("n_estimators", vec![50i64, 100, 200])
                    .with_axis("max_depth", vec![None, Some(10i64), Some(20)])
                    .with_axis("min_samples_split", vec![2i64, 5, 10]),
            ))
            .with_family(FamilySpec::new(
                ModelFamily::Svm,
                ParamGrid::new()
                    .with_axis("C", vec![0.001, 0.01, 0.1, 1.0, 10.0])
                    .with_axis("kernel", vec!["linear", "rbf"]),
            ))
            .with_family(FamilySpec::new(
                ModelFamily::Knn,
                ParamGrid::new()
                    .with_axis("n_neighbors", vec![3i64, 5, 7, 9])
                    .with_axis("weights", vec!["uniform", "distance"]),
            ))
    }

    /// One- or two-point grids for smoke runs
    pub fn quick() -> Self {
        Self::new()
            .with_family(FamilySpec::new(
                ModelFamily::LogisticRegression,
                ParamGrid::new().with_axis("C", vec![0.1, 1.0]),
            ))
            .with_family(FamilySpec::new(
                ModelFamily::DecisionTree,
                ParamGrid::new().with_axis("max_depth", vec![None, Some(10i64)]),
            ))
            .with_family(
                FamilySpec::new(
                    ModelFamily::RandomForest,
                    ParamGrid::new().with_axis("n_estimators", vec![50i64]),
                )
                .with_fixed("max_depth", 20i64),
            )
            .with_family(
                FamilySpec::new(
                    ModelFamily::Svm,
                    ParamGrid::new().with_axis("C", vec![1.0]).with_axis("kernel", vec!["linear", "rbf"]),
                )
                .with_fixed("max_train_samples", 600i64)
                .with_fixed("max_iter", 50i64),
            )
            .with_family(FamilySpec::new(
                ModelFamily::Knn,
                ParamGrid::new()
                    .with_axis("n_neighbors", vec![5i64])
                    .with_axis("weights", vec!["uniform", "distance"]),
            ))
    }

    pub fn families(&self) -> &[FamilySpec] {
        &self.families
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
