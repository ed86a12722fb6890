//! Integration tests for the preprocessing stages: cleaning, imputation,
//! outlier filtering, encoding, feature selection and scaling

use injury_severity::dataset::{Column, ColumnKind, Dataset};
use injury_severity::preprocessing::{
    ClassLabels, Cleaner, Encoder, FeatureSelector, FillThreshold, ImputationPlan, ImputeStrategy, Imputer,
    OutlierColumns, OutlierFilter, PreprocessingConfig, Scaler,
};
use ndarray::{Array2, Axis};

fn incidents() -> Dataset {
    let n = 60;
    let mut age = Vec::with_capacity(n);
    let mut hours = Vec::with_capacity(n);
    let mut sex = Vec::with_capacity(n);
    let mut event = Vec::with_capacity(n);
    let mut report_id = Vec::with_capacity(n);
    let mut sparse = Vec::with_capacity(n);
    let mut degree = Vec::with_capacity(n);

    for i in 0..n {
        let severe = i % 3 == 0;
        age.push(if i % 11 == 0 { None } else { Some(20.0 + (i % 40) as f64) });
        hours.push(Some(if severe { 10.0 } else { 4.0 } + (i as f64 * 0.37).sin()));
        sex.push(if i % 7 == 0 { None } else { Some(if i % 2 == 0 { "M" } else { "F" }) });
        event.push(Some(if severe { "fall" } else if i % 2 == 0 { "cut" } else { "strain" }));
        report_id.push(Some(format!("r{}", i)));
        sparse.push(if i < 3 { Some(1.0) } else { None });
        degree.push(Some(if severe { "hospitalized" } else { "non-hospitalized" }));
    }

    Dataset::new(vec![
        Column::numeric("age", age),
        Column::numeric("hours", hours),
        Column::categorical_from("sex", &sex),
        Column::categorical_from("event", &event),
        Column::categorical("report_id", report_id),
        Column::numeric("sparse", sparse),
        Column::categorical_from("degree", &degree),
    ])
    .unwrap()
}

// ============================================================================
// Cleaner
// ============================================================================

#[test]
fn test_cleaner_drops_listed_and_low_fill_columns() {
    let cleaner = Cleaner::new(vec!["report_id".to_string(), "not_there".to_string()], FillThreshold::MinCount(10))
        .with_protected(vec!["degree".to_string()]);
    let (cleaned, report) = cleaner.clean(incidents()).unwrap();

    assert!(!cleaned.has_column("report_id"));
    assert!(!cleaned.has_column("sparse"));
    assert!(cleaned.has_column("degree"));
    assert_eq!(report.low_fill_columns, vec!["sparse".to_string()]);
}

#[test]
fn test_cleaner_is_idempotent() {
    let cleaner = Cleaner::new(vec!["report_id".to_string()], FillThreshold::MinFraction(0.5));
    let (once, _) = cleaner.clean(incidents()).unwrap();
    let (twice, report) = cleaner.clean(once.clone()).unwrap();
    assert_eq!(once, twice);
    assert_eq!(report.duplicates_removed, 0);
}

// ============================================================================
// Imputer
// ============================================================================

#[test]
fn test_imputer_by_kind_leaves_no_missing() {
    let dataset = incidents();
    let plan = ImputationPlan::by_kind(&dataset, &["degree"]);
    let imputed = Imputer::new().fit_transform(dataset, &plan).unwrap();

    for name in ["age", "hours", "sex", "event", "sparse"] {
        assert_eq!(imputed.column(name).unwrap().missing_count(), 0, "column {}", name);
    }
}

#[test]
fn test_all_missing_median_fills_zero() {
    let dataset = Dataset::new(vec![Column::numeric("empty", vec![None, None, None])]).unwrap();
    let plan = ImputationPlan::new().with("empty", ImputeStrategy::Median);
    let imputed = Imputer::new().fit_transform(dataset, &plan).unwrap();
    let column = imputed.column("empty").unwrap();
    assert!(column.as_numeric().unwrap().into_iter().all(|v| v == Some(0.0)));
}

#[test]
fn test_osha_style_plan_is_explicit() {
    let config = PreprocessingConfig::osha();
    let dataset = incidents();
    let imputed = Imputer::new().fit_transform(dataset, &config.imputation).unwrap();
    assert_eq!(imputed.column("sex").unwrap().missing_count(), 0);
    // age is not part of the explicit plan
    assert!(imputed.column("age").unwrap().missing_count() > 0);
}

// ============================================================================
// Outlier filter
// ============================================================================

#[test]
fn test_outlier_filter_is_monotone() {
    let mut values: Vec<Option<f64>> = (0..40).map(|i| Some(i as f64)).collect();
    values.push(Some(1_000.0));
    values.push(None);
    let dataset = Dataset::new(vec![Column::numeric("x", values)]).unwrap();

    let columns = OutlierColumns::NumericInSchemaOrder.resolve(&dataset, &[] as &[&str]);
    let (filtered, bounds) = OutlierFilter::new(1.5).filter(dataset.clone(), &columns).unwrap();

    assert!(filtered.n_rows() <= dataset.n_rows());
    assert_eq!(filtered.n_rows(), 40);
    // the extreme value and the missing cell both fall outside the fence
    assert_eq!(bounds[0].rows_removed, 2);
    assert_eq!(filtered.column("x").unwrap().missing_count(), 0);
}

// ============================================================================
// Encoder
// ============================================================================

#[test]
fn test_encoder_round_trip_and_unseen_category() {
    let dataset = incidents();
    let categorical = vec!["event".to_string()];
    let mut encoder = Encoder::new();
    let features = Dataset::new(vec![dataset.column("event").unwrap()]).unwrap();
    let x = encoder.fit_transform(&features, &categorical).unwrap();

    assert_eq!(encoder.feature_space().names(), &["event_fall", "event_strain", "event_cut"]);
    let event = features.column("event").unwrap();
    for (row, original) in x.axis_iter(Axis(0)).zip(event.as_categorical().unwrap().into_iter()) {
        let decoded = encoder.decode_row(row);
        assert_eq!(decoded[0].1.as_deref(), original);
    }

    let unseen = Dataset::new(vec![Column::categorical_from("event", &[Some("burn")])]).unwrap();
    let encoded = encoder.transform(&unseen).unwrap();
    assert!(encoded.iter().all(|&v| v == 0.0));
}

// ============================================================================
// Feature selection and scaling
// ============================================================================

#[test]
fn test_feature_selector_never_empty() {
    let dataset = incidents();
    let (target, features) = dataset.split_column("degree").unwrap();
    let labels = ClassLabels::fit(&target).unwrap();
    let y = labels.encode(&target).unwrap();

    let plan = ImputationPlan::by_kind(&features, &[] as &[&str]);
    let features = Imputer::new().fit_transform(features, &plan).unwrap();
    let categorical = features.names_of_kind(ColumnKind::Categorical);
    let mut encoder = Encoder::new();
    let x = encoder.fit_transform(&features, &categorical).unwrap();

    let mut selector = FeatureSelector::new().with_threshold(1.0).with_n_estimators(20);
    let selected = selector.fit_transform(&x, &y, labels.len(), encoder.feature_space().names()).unwrap();
    assert_eq!(selected.ncols(), 1);

    let mut selector = FeatureSelector::new().with_n_estimators(20);
    selector.fit(&x, &y, labels.len(), encoder.feature_space().names()).unwrap();
    let ranking = selector.ranking().unwrap();
    assert!((ranking.scores().iter().sum::<f64>() - 1.0).abs() < 1e-9);
    assert!(!selector.selected().unwrap().is_empty());
}

#[test]
fn test_scaler_standardizes_and_handles_constant_columns() {
    let x = Array2::from_shape_fn((50, 2), |(i, j)| if j == 0 { i as f64 * 3.0 + 7.0 } else { 4.0 });
    let mut scaler = Scaler::new();
    let scaled = scaler.fit_transform(&x).unwrap();

    let col = scaled.column(0);
    assert!(col.mean().unwrap().abs() < 1e-9);
    assert!((col.std(0.0) - 1.0).abs() < 1e-9);
    assert!(scaled.column(1).iter().all(|&v| v == 0.0));

    // a constant shift of the input shifts the output by shift / std
    let shifted = x.mapv(|v| v + 3.0);
    let out = scaler.transform(&shifted).unwrap();
    let std = scaler.params()[0].std;
    for (a, b) in out.column(0).iter().zip(scaled.column(0).iter()) {
        assert!((a - b - 3.0 / std).abs() < 1e-9);
    }
}
