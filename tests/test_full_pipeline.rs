//! End-to-end tests: raw incident table to persisted artifact and back

use injury_severity::dataset::{Column, Dataset, Record};
use injury_severity::error::SeverityError;
use injury_severity::export::{ExportFormat, TrainedArtifact};
use injury_severity::pipeline::{AbortHandle, BalancePlacement, PipelineConfig, PipelineReport, TrainingPipeline};
use injury_severity::preprocessing::{OutlierColumns, PreprocessingConfig};
use injury_severity::training::{FamilySpec, ModelFamily, ModelRegistry, ParamGrid, RegistryKind};
use rand::prelude::*;
use std::sync::OnceLock;

const N_CATEGORICAL: usize = 10;
const N_NUMERIC: usize = 30;
const N_INFORMATIVE_NUMERIC: usize = 4;
const N_INFORMATIVE_CATEGORICAL: usize = 3;

/// Incident table with a numeric three-level `degree_of_inj` target
/// (70/20/10), informative and noise columns, and 5% missing cells.
/// Informative numeric columns overlap across classes so the default
/// 1.5 IQR fence keeps the rarest class.
fn synthetic_incidents(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let classes: Vec<usize> = (0..n)
        .map(|_| {
            let u: f64 = rng.gen();
            if u < 0.7 {
                0
            } else if u < 0.9 {
                1
            } else {
                2
            }
        })
        .collect();

    let mut columns = Vec::with_capacity(N_NUMERIC + N_CATEGORICAL + 1);

    for j in 0..N_NUMERIC {
        let values = classes
            .iter()
            .map(|&class| {
                if rng.gen::<f64>() < 0.05 {
                    return None;
                }
                Some(if j < N_INFORMATIVE_NUMERIC {
                    class as f64 + rng.gen_range(-2.0..2.0)
                } else {
                    rng.gen_range(0.0..10.0)
                })
            })
            .collect();
        columns.push(Column::numeric(format!("n{}", j), values));
    }

    for j in 0..N_CATEGORICAL {
        let values: Vec<Option<String>> = classes
            .iter()
            .map(|&class| {
                if rng.gen::<f64>() < 0.05 {
                    return None;
                }
                Some(if j < N_INFORMATIVE_CATEGORICAL {
                    let level = if rng.gen::<f64>() < 0.8 { class } else { rng.gen_range(0..3) };
                    format!("a{}", level)
                } else {
                    format!("z{}", rng.gen_range(0..5))
                })
            })
            .collect();
        columns.push(Column::categorical(format!("c{}", j), values));
    }

    let target = classes.iter().map(|&class| Some((class + 1) as f64)).collect();
    columns.push(Column::numeric("degree_of_inj", target));

    Dataset::new(columns).unwrap()
}

/// Default preprocessing and five-fold search over the quick registry
fn full_config() -> PipelineConfig {
    PipelineConfig::new("degree_of_inj").with_registry(RegistryKind::Quick).with_cv_folds(5)
}

fn trained() -> &'static (TrainedArtifact, PipelineReport) {
    static TRAINED: OnceLock<(TrainedArtifact, PipelineReport)> = OnceLock::new();
    TRAINED.get_or_init(|| TrainingPipeline::new(full_config()).run(synthetic_incidents(5000, 7)).unwrap())
}

fn record_from_row(dataset: &Dataset, row: usize) -> Record {
    dataset.record(row)
}

// ============================================================================
// Quality
// ============================================================================

#[test]
fn test_end_to_end_macro_f1() {
    let (_, report) = trained();
    let metrics = report.selection.test_metrics.as_ref().unwrap();
    assert!(metrics.f1_score > 0.6, "macro F1 {}", metrics.f1_score);
    assert_eq!(report.class_labels, vec!["1", "2", "3"]);
    assert_eq!(report.selection.candidates.len(), 5);
}

#[test]
fn test_default_outlier_fence_keeps_every_class() {
    let (_, report) = trained();
    assert_eq!(report.outlier_bounds.len(), N_NUMERIC);
    assert!(report.outlier_bounds.iter().all(|b| b.column != "degree_of_inj"));
    assert_eq!(report.rows_after_outliers, report.rows_after_cleaning - report.rows_missing_target);
    assert!(report.class_counts_before_balance.values().all(|&n| n > 0));
}

#[test]
fn test_feature_selection_shrinks_feature_space() {
    let (artifact, report) = trained();
    assert!(!report.selected_features.is_empty());
    assert!(report.selected_features.len() < report.n_encoded_features);
    assert_eq!(artifact.selected.len(), report.selected_features.len());
    assert!(report.importance.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn test_training_partition_is_balanced() {
    let (_, report) = trained();
    let after: Vec<usize> = report.class_counts_after_balance.values().copied().collect();
    assert!(after.iter().all(|&c| c == after[0]));
    let before: usize = report.class_counts_before_balance.values().sum();
    assert_eq!(before + report.n_test, report.rows_after_outliers);
}

// ============================================================================
// Artifact
// ============================================================================

#[test]
fn test_artifact_round_trip_in_both_formats() {
    let (artifact, _) = trained();
    let holdout = synthetic_incidents(200, 99);
    let expected = artifact.predict_dataset(&holdout).unwrap();

    let dir = tempfile::tempdir().unwrap();
    for (name, format) in [("model.bin", ExportFormat::Binary), ("model.json", ExportFormat::Json)] {
        let path = dir.path().join(name);
        artifact.clone().save(&path, format).unwrap();
        let loaded = TrainedArtifact::load(&path).unwrap();
        assert_eq!(loaded.metadata, artifact.metadata);
        assert_eq!(loaded.predict_dataset(&holdout).unwrap(), expected);
    }
}

#[test]
fn test_record_prediction_matches_batch() {
    let (artifact, _) = trained();
    let holdout = synthetic_incidents(20, 5);
    let batch = artifact.predict_dataset(&holdout).unwrap();
    for (row, label) in batch.iter().enumerate() {
        let record = record_from_row(&holdout, row);
        assert_eq!(&artifact.predict_record(&record).unwrap(), label);
    }
}

#[test]
fn test_record_missing_a_feature_column_is_rejected() {
    let (artifact, _) = trained();
    let holdout = synthetic_incidents(1, 3);
    let mut record = Record::new();
    let required = artifact.required_columns();
    for name in required.iter().skip(1) {
        if let Some(value) = holdout.record(0).get(name) {
            record.insert(name.clone(), value.clone());
        }
    }

    match artifact.predict_record(&record) {
        Err(SeverityError::SchemaError(msg)) => {
            assert!(msg.contains("incompatible schema"));
            assert!(msg.contains(&required[0]));
        }
        other => panic!("expected incompatible schema, got {:?}", other),
    }
}

// ============================================================================
// Placement, degenerate data and cancellation
// ============================================================================

fn tree_registry() -> ModelRegistry {
    ModelRegistry::new().with_family(FamilySpec::new(
        ModelFamily::DecisionTree,
        ParamGrid::new().with_axis("max_depth", vec![6i64]),
    ))
}

#[test]
fn test_balance_before_split() {
    let config = full_config().with_balance_placement(BalancePlacement::BeforeSplit);
    let (_, report) = TrainingPipeline::new(config)
        .with_registry(tree_registry())
        .run(synthetic_incidents(600, 11))
        .unwrap();

    let before: usize = report.class_counts_before_balance.values().sum();
    assert_eq!(before, report.rows_after_outliers);
    let max = *report.class_counts_before_balance.values().max().unwrap();
    assert_eq!(report.n_train + report.n_test, max * 3);
}

#[test]
fn test_class_smaller_than_fold_count_is_degenerate() {
    let dataset = Dataset::new(vec![
        Column::numeric_dense("x", (0..30).map(|i| i as f64).collect()),
        Column::categorical_from(
            "degree",
            &(0..30).map(|i| Some(if i < 2 { "fatality" } else { "minor" })).collect::<Vec<_>>(),
        ),
    ])
    .unwrap();
    let config = PipelineConfig::new("degree")
        .with_preprocessing(PreprocessingConfig::new().with_outlier_columns(OutlierColumns::Disabled));
    let err = TrainingPipeline::new(config).with_registry(tree_registry()).run(dataset).unwrap_err();
    assert!(matches!(err, SeverityError::DegenerateData(_)));
}

#[test]
fn test_cancelled_pipeline_reports_stage() {
    let handle = AbortHandle::new();
    let pipeline = TrainingPipeline::new(full_config())
        .with_registry(tree_registry())
        .with_abort_handle(handle.clone());
    handle.abort();

    match pipeline.run(synthetic_incidents(300, 1)) {
        Err(SeverityError::Cancelled { stage }) => assert_eq!(stage, "clean"),
        other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
    }
}
