use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use injury_severity::dataset::{Column, Dataset};
use injury_severity::pipeline::{PipelineConfig, TrainingPipeline};
use injury_severity::synthetic::{Sampler, SMOTE};
use injury_severity::training::{FamilySpec, ModelFamily, ModelRegistry, ParamGrid};
use ndarray::{Array1, Array2};
use rand::prelude::*;

fn create_incidents(n_rows: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(42);
    let classes: Vec<usize> = (0..n_rows).map(|_| if rng.gen::<f64>() < 0.8 { 0 } else { 1 }).collect();

    let mut columns: Vec<Column> = (0..8)
        .map(|j| {
            let values = classes
                .iter()
                .map(|&c| Some(c as f64 * (j % 2) as f64 + rng.gen::<f64>() * 2.0))
                .collect();
            Column::numeric(format!("n{}", j), values)
        })
        .collect();
    for j in 0..4 {
        let values = classes
            .iter()
            .map(|&c| {
                let level = if rng.gen::<f64>() < 0.7 { c } else { rng.gen_range(0..4) };
                Some(format!("v{}", level + j))
            })
            .collect();
        columns.push(Column::categorical(format!("c{}", j), values));
    }
    let target = classes
        .iter()
        .map(|&c| Some(if c == 1 { "hospitalized" } else { "non-hospitalized" }.to_string()))
        .collect();
    columns.push(Column::categorical("degree", target));

    Dataset::new(columns).unwrap()
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10); // Fewer samples for training benchmarks

    let registry = ModelRegistry::new()
        .with_family(FamilySpec::new(
            ModelFamily::LogisticRegression,
            ParamGrid::new().with_axis("C", vec![1.0]),
        ))
        .with_family(FamilySpec::new(
            ModelFamily::DecisionTree,
            ParamGrid::new().with_axis("max_depth", vec![10i64]),
        ));

    for n_rows in [1000, 5000].iter() {
        let dataset = create_incidents(*n_rows);
        group.bench_with_input(BenchmarkId::new("run", n_rows), &dataset, |b, dataset| {
            b.iter(|| {
                let config = PipelineConfig::new("degree").with_cv_folds(3);
                let pipeline = TrainingPipeline::new(config).with_registry(registry.clone());
                pipeline.run(black_box(dataset.clone())).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_smote(c: &mut Criterion) {
    let mut group = c.benchmark_group("smote");
    let mut rng = StdRng::seed_from_u64(7);

    for n_rows in [1000, 10000].iter() {
        let x = Array2::from_shape_fn((*n_rows, 20), |_| rng.gen::<f64>());
        let y = Array1::from_shape_fn(*n_rows, |i| usize::from(i % 10 == 0));
        group.bench_with_input(BenchmarkId::new("fit_resample", n_rows), &(x, y), |b, (x, y)| {
            b.iter(|| SMOTE::new().fit_resample(black_box(x), black_box(y)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_smote);
criterion_main!(benches);
