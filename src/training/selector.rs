//! Cross-validated model search and selection

use super::cross_validation::{CVSplit, CVStrategy, CrossValidator};
use super::metrics::{accuracy, ModelMetrics};
use super::models::{Diagnostic, Estimator};
use super::search::{FamilySpec, ModelFamily, ModelRegistry, ParamGrid, TrialParams};
use crate::error::{SeverityError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of one family inside the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyState {
    Untuned,
    Searching,
    Tuned,
    Evaluated,
    FailedTuning,
}

impl FamilyState {
    fn can_advance_to(self, to: FamilyState) -> bool {
        use FamilyState::*;
        matches!(
            (self, to),
            (Untuned, Searching)
                | (Searching, Tuned)
                | (Searching, FailedTuning)
                | (Tuned, Evaluated)
                | (Tuned, FailedTuning)
        )
    }
}

/// Lifecycle of the selector as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorState {
    Untuned,
    PerFamilySearching,
    PerFamilyTuned,
    Evaluated,
    Selected,
    Persisted,
}

impl SelectorState {
    fn next(self) -> Option<SelectorState> {
        use SelectorState::*;
        match self {
            Untuned => Some(PerFamilySearching),
            PerFamilySearching => Some(PerFamilyTuned),
            PerFamilyTuned => Some(Evaluated),
            Evaluated => Some(Selected),
            Selected => Some(Persisted),
            Persisted => None,
        }
    }
}

impl fmt::Display for FamilyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for SelectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Cross-validation outcome of one hyperparameter combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboResult {
    pub params: TrialParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// One family's search state, results and (once tuned) fitted estimator
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    pub family: ModelFamily,
    pub grid: ParamGrid,
    pub results: Vec<ComboResult>,
    pub best_params: Option<TrialParams>,
    pub estimator: Option<Estimator>,
    pub cv_score: Option<f64>,
    pub test_metrics: Option<ModelMetrics>,
    pub diagnostics: Vec<Diagnostic>,
    pub failure: Option<String>,
    state: FamilyState,
}

impl ModelCandidate {
    fn new(spec: &FamilySpec) -> Self {
        Self {
            family: spec.family,
            grid: spec.grid.clone(),
            results: Vec::new(),
            best_params: None,
            estimator: None,
            cv_score: None,
            test_metrics: None,
            diagnostics: Vec::new(),
            failure: None,
            state: FamilyState::Untuned,
        }
    }

    pub fn state(&self) -> FamilyState {
        self.state
    }

    fn transition(&mut self, to: FamilyState) -> Result<()> {
        if !self.state.can_advance_to(to) {
            return Err(SeverityError::InvalidTransition {
                from: format!("{}:{}", self.family, self.state),
                to: format!("{}:{}", self.family, to),
            });
        }
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, reason: String) -> Result<()> {
        warn!(family = %self.family, reason = %reason, "Model family failed tuning");
        self.transition(FamilyState::FailedTuning)?;
        self.failure = Some(reason);
        self.estimator = None;
        Ok(())
    }

    fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            family: self.family.name().to_string(),
            state: self.state,
            best_params: self.best_params.clone(),
            cv_score: self.cv_score,
            results: self.results.clone(),
            test_metrics: self.test_metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            failure: self.failure.clone(),
        }
    }
}

/// Serializable view of a candidate, without the fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub family: String,
    pub state: FamilyState,
    pub best_params: Option<TrialParams>,
    pub cv_score: Option<f64>,
    pub results: Vec<ComboResult>,
    pub test_metrics: Option<ModelMetrics>,
    pub diagnostics: Vec<Diagnostic>,
    pub failure: Option<String>,
}

/// Outcome of a completed selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub selected_family: String,
    pub selected_params: TrialParams,
    pub cv_score: f64,
    pub test_metrics: Option<ModelMetrics>,
    pub candidates: Vec<CandidateSummary>,
    pub search_time_secs: f64,
}

/// One (family, combination, fold) unit of grid-search work
struct SearchTask<'a> {
    candidate_idx: usize,
    combo_idx: usize,
    params: &'a TrialParams,
    split: &'a CVSplit,
}

/// Grid search over a registry of families with stratified k-fold CV,
/// refit of each family's best combination, hold-out evaluation, and
/// selection by CV score.
#[derive(Debug)]
pub struct ModelSelector {
    registry: ModelRegistry,
    cv_folds: usize,
    random_state: u64,
    n_jobs: Option<usize>,
    state: SelectorState,
    candidates: Vec<ModelCandidate>,
    selected: Option<usize>,
    search_time_secs: f64,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            cv_folds: 5,
            random_state: 42,
            n_jobs: None,
            state: SelectorState::Untuned,
            candidates: Vec::new(),
            selected: None,
            search_time_secs: 0.0,
        }
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Worker threads for the search; None uses every core
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    fn advance(&mut self, to: SelectorState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(SeverityError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!(from = %self.state, to = %to, "Selector transition");
        self.state = to;
        Ok(())
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs.unwrap_or(0))
            .build()
            .map_err(|e| SeverityError::TrainingError(format!("failed to build thread pool: {}", e)))
    }

    /// Tune every family on the training partition and refit each family's
    /// best combination on all of it.
    pub fn search(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<&mut Self> {
        if self.registry.is_empty() {
            return Err(SeverityError::TrainingError("model registry is empty".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(SeverityError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.advance(SelectorState::PerFamilySearching)?;
        let start = Instant::now();

        let splits = CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.cv_folds,
            shuffle: true,
        })
        .with_random_state(self.random_state)
        .split(y)?;

        self.candidates = self.registry.families().iter().map(ModelCandidate::new).collect();
        for candidate in &mut self.candidates {
            candidate.transition(FamilyState::Searching)?;
        }

        let combos: Vec<Vec<TrialParams>> = self.registry.families().iter().map(FamilySpec::combinations).collect();
        let tasks: Vec<SearchTask> = combos
            .iter()
            .enumerate()
            .flat_map(|(candidate_idx, family_combos)| {
                let splits = &splits;
                family_combos.iter().enumerate().flat_map(move |(combo_idx, params)| {
                    splits.iter().map(move |split| SearchTask {
                        candidate_idx,
                        combo_idx,
                        params,
                        split,
                    })
                })
            })
            .collect();

        info!(
            families = self.candidates.len(),
            tasks = tasks.len(),
            folds = self.cv_folds,
            "Starting grid search"
        );

        let pool = self.thread_pool()?;
        let families: Vec<ModelFamily> = self.candidates.iter().map(|c| c.family).collect();
        let seed = self.random_state;

        let outcomes: Vec<Result<f64>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    let family = families[task.candidate_idx];
                    let mut estimator = family.build(task.params, seed)?;
                    let x_train = x.select(Axis(0), &task.split.train_indices);
                    let y_train: Array1<usize> = task.split.train_indices.iter().map(|&i| y[i]).collect();
                    let x_val = x.select(Axis(0), &task.split.test_indices);
                    let y_val: Array1<usize> = task.split.test_indices.iter().map(|&i| y[i]).collect();

                    estimator.fit(&x_train, &y_train, n_classes)?;
                    let pred = estimator.predict(&x_val)?;
                    Ok(accuracy(&y_val, &pred))
                })
                .collect()
        });

        // Barrier: every fold of every family is in before any best combination is chosen
        let mut fold_scores: Vec<Vec<Vec<f64>>> = combos.iter().map(|c| vec![Vec::new(); c.len()]).collect();
        let mut first_error: Vec<Option<String>> = vec![None; self.candidates.len()];
        for (task, outcome) in tasks.iter().zip(outcomes) {
            match outcome {
                Ok(score) => fold_scores[task.candidate_idx][task.combo_idx].push(score),
                Err(e) => {
                    let slot = &mut first_error[task.candidate_idx];
                    if slot.is_none() {
                        *slot = Some(format!("{} with {}: {}", families[task.candidate_idx], task.params, e));
                    }
                }
            }
        }

        for (idx, candidate) in self.candidates.iter_mut().enumerate() {
            if let Some(reason) = first_error[idx].take() {
                candidate.fail(reason)?;
                continue;
            }

            candidate.results = combos[idx]
                .iter()
                .zip(fold_scores[idx].drain(..))
                .map(|(params, scores)| ComboResult {
                    params: params.clone(),
                    mean_score: scores.iter().sum::<f64>() / scores.len().max(1) as f64,
                    fold_scores: scores,
                })
                .collect();

            let mut best: Option<&ComboResult> = None;
            for result in &candidate.results {
                if best.map_or(true, |b| result.mean_score > b.mean_score) {
                    best = Some(result);
                }
            }
            if let Some(best) = best {
                candidate.best_params = Some(best.params.clone());
                candidate.cv_score = Some(best.mean_score);
                info!(
                    family = %candidate.family,
                    cv_score = %format!("{:.4}", best.mean_score),
                    params = %best.params,
                    "Family tuned"
                );
            }
        }

        // Refit best combinations on the whole training partition
        let refits: Vec<Option<Result<Estimator>>> = pool.install(|| {
            self.candidates
                .par_iter()
                .map(|candidate| {
                    if candidate.state != FamilyState::Searching {
                        return None;
                    }
                    let params = candidate.best_params.as_ref()?;
                    Some(candidate.family.build(params, seed).and_then(|mut est| {
                        est.fit(x, y, n_classes)?;
                        Ok(est)
                    }))
                })
                .collect()
        });

        for (candidate, refit) in self.candidates.iter_mut().zip(refits) {
            match refit {
                None => {
                    if candidate.state == FamilyState::Searching {
                        candidate.fail("no hyperparameter combinations to evaluate".to_string())?;
                    }
                }
                Some(Err(e)) => candidate.fail(format!("refit failed: {}", e))?,
                Some(Ok(estimator)) => {
                    candidate.diagnostics = estimator.diagnostics();
                    for diag in &candidate.diagnostics {
                        warn!(family = %candidate.family, "{}", diag);
                    }
                    candidate.estimator = Some(estimator);
                    candidate.transition(FamilyState::Tuned)?;
                }
            }
        }

        if !self.candidates.iter().any(|c| c.state == FamilyState::Tuned) {
            return Err(SeverityError::TrainingError(
                "every model family failed tuning".to_string(),
            ));
        }

        self.search_time_secs = start.elapsed().as_secs_f64();
        self.advance(SelectorState::PerFamilyTuned)?;
        Ok(self)
    }

    /// Score every tuned family on the held-out partition
    pub fn evaluate(&mut self, x_test: &Array2<f64>, y_test: &Array1<usize>, labels: &[String]) -> Result<&mut Self> {
        self.advance(SelectorState::Evaluated)?;

        for candidate in self.candidates.iter_mut().filter(|c| c.state == FamilyState::Tuned) {
            let Some(estimator) = candidate.estimator.as_ref() else {
                continue;
            };
            let scored = estimator
                .predict(x_test)
                .and_then(|pred| Ok((pred, estimator.predict_proba(x_test)?)));
            let (pred, proba) = match scored {
                Ok(scored) => scored,
                Err(e) => {
                    candidate.fail(format!("evaluation failed: {}", e))?;
                    continue;
                }
            };
            let metrics = ModelMetrics::compute_classification(y_test, &pred, proba.as_ref(), labels);

            info!(
                family = %candidate.family,
                accuracy = %format!("{:.4}", metrics.accuracy),
                f1_macro = %format!("{:.4}", metrics.f1_score),
                auc_roc = ?metrics.auc_roc,
                "Family evaluated"
            );
            candidate.test_metrics = Some(metrics);
            candidate.transition(FamilyState::Evaluated)?;
        }
        Ok(self)
    }

    /// Pick the evaluated family with the highest CV score (ties go to
    /// registry order). Test metrics never take part.
    pub fn select(&mut self) -> Result<&ModelCandidate> {
        self.advance(SelectorState::Selected)?;

        let mut best: Option<usize> = None;
        for (idx, candidate) in self.candidates.iter().enumerate() {
            if candidate.state != FamilyState::Evaluated {
                continue;
            }
            let score = candidate.cv_score.unwrap_or(f64::NEG_INFINITY);
            let better = match best {
                None => true,
                Some(b) => score > self.candidates[b].cv_score.unwrap_or(f64::NEG_INFINITY),
            };
            if better {
                best = Some(idx);
            }
        }

        let idx = best.ok_or_else(|| SeverityError::TrainingError("no evaluated model family to select".to_string()))?;
        self.selected = Some(idx);
        let chosen = &self.candidates[idx];
        info!(family = %chosen.family, cv_score = ?chosen.cv_score, "Selected model");
        Ok(chosen)
    }

    pub fn selected(&self) -> Option<&ModelCandidate> {
        self.selected.map(|i| &self.candidates[i])
    }

    /// Hand the selected estimator over for persistence
    pub fn take_selected(&mut self) -> Result<(Estimator, SelectionReport)> {
        let idx = self.selected.ok_or_else(|| SeverityError::InvalidTransition {
            from: self.state.to_string(),
            to: SelectorState::Persisted.to_string(),
        })?;
        self.advance(SelectorState::Persisted)?;

        let report = SelectionReport {
            selected_family: self.candidates[idx].family.name().to_string(),
            selected_params: self.candidates[idx].best_params.clone().unwrap_or_default(),
            cv_score: self.candidates[idx].cv_score.unwrap_or(0.0),
            test_metrics: self.candidates[idx].test_metrics.clone(),
            candidates: self.candidates.iter().map(ModelCandidate::summary).collect(),
            search_time_secs: self.search_time_secs,
        };
        let estimator = self.candidates[idx]
            .estimator
            .take()
            .ok_or(SeverityError::ModelNotFitted)?;
        Ok((estimator, report))
    }
}
