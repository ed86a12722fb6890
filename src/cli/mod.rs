//! Injury-severity CLI Module
//!
//! Command-line interface for training, batch prediction, and data inspection.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use polars::prelude::{CsvWriter, NamedFrom, SerWriter, Series};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::dataset::{load_csv, ColumnKind, Dataset, SchemaSpec};
use crate::export::{ExportFormat, TrainedArtifact};
use crate::pipeline::{PipelineConfig, PipelineReport, TrainingPipeline};
use crate::training::RegistryKind;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn line_box_center(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let total_pad = W.saturating_sub(visible_len);
    let left = total_pad / 2;
    let right = total_pad - left;
    println!("  {}  {}{}{} {}", dim("│"), " ".repeat(left), content, " ".repeat(right), dim("│"));
}

fn line_box_empty() { line_box(""); }

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "injury-severity")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and apply injury-severity classifiers on incident records")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Built-in configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// OSHA degree-of-injury study settings
    Osha,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline and save the selected model
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name (overrides the config or preset)
        #[arg(short, long)]
        target: Option<String>,

        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Start from a built-in preset instead of the defaults
        #[arg(long, value_enum, conflicts_with = "config")]
        preset: Option<Preset>,

        /// Search the small smoke-test grids
        #[arg(long)]
        quick: bool,

        /// Worker threads for the model search (default: all cores)
        #[arg(long)]
        n_jobs: Option<usize>,

        /// Output artifact file
        #[arg(short, long, default_value = "model.bin")]
        output: PathBuf,

        /// Artifact format (binary, json); guessed from the output extension if omitted
        #[arg(long)]
        format: Option<String>,

        /// Write the pipeline report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Columns to read and encode as categorical, comma separated
        #[arg(long, value_delimiter = ',')]
        categorical: Option<Vec<String>>,
    },

    /// Predict severity labels with a saved model
    Predict {
        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file (input columns plus a prediction column)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show column kinds and missing counts of a CSV file
    Info {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data_path: &Path,
    target: Option<&str>,
    config_path: Option<&Path>,
    preset: Option<Preset>,
    quick: bool,
    n_jobs: Option<usize>,
    output: &Path,
    format: Option<&str>,
    report_path: Option<&Path>,
    categorical: Option<Vec<String>>,
) -> anyhow::Result<()> {
    section("Train");

    let mut config = match (config_path, preset) {
        (Some(path), _) => PipelineConfig::from_json_file(path)?,
        (None, Some(Preset::Osha)) => PipelineConfig::osha(),
        (None, None) => PipelineConfig::default(),
    };
    if let Some(target) = target {
        config.target_column = target.to_string();
    } else if config_path.is_none() && preset.is_none() {
        anyhow::bail!("--target is required without --config or --preset");
    }
    if quick {
        config.registry = RegistryKind::Quick;
    }
    if n_jobs.is_some() {
        config.n_jobs = n_jobs;
    }
    let mut schema = SchemaSpec::new();
    if let Some(columns) = categorical {
        schema = schema.with_categorical(columns.iter().cloned());
        config.preprocessing.categorical_columns = Some(columns);
    }
    let format = match format {
        Some(f) => f.parse::<ExportFormat>()?,
        None => ExportFormat::from_path(output),
    };

    step_run("Loading data");
    let start = Instant::now();
    let dataset = load_csv(data_path, &schema)?;
    step_done(&format!("{} rows × {} cols in {:?}", dataset.n_rows(), dataset.n_cols(), start.elapsed()));

    step_run(&format!("Training on {}", config.target_column.cyan()));
    let start = Instant::now();
    let (artifact, report) = TrainingPipeline::new(config).run(dataset)?;
    step_done(&format!("{:.1?}", start.elapsed()));

    print_report(&report);

    step_run(&format!("Saving → {}", output.display()));
    artifact.save(output, format)?;
    step_done(&format!("{:?}", format).to_lowercase());

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        step_ok(&format!("Report written to {}", path.display()));
    }

    println!();
    Ok(())
}

fn print_report(report: &PipelineReport) {
    let selection = &report.selection;

    println!();
    line_box_top();
    line_box_empty();
    line_box_center(&format!("{}", selection.selected_family.white().bold()));
    line_box_center(&format!("{}", dim(&selection.selected_params.to_string())));
    line_box_empty();
    line_box_sep();
    line_box(&kv("Rows        ", &format!("{} → {}", report.rows_in, report.rows_after_outliers)));
    line_box(&kv("Features    ", &format!("{} → {}", report.n_encoded_features, report.selected_features.len())));
    line_box(&kv("Train/test  ", &format!("{} / {}", report.n_train, report.n_test)));
    line_box(&kv("CV accuracy ", &format!("{:.4}", selection.cv_score)));
    if let Some(metrics) = &selection.test_metrics {
        line_box(&kv("Test acc    ", &format!("{:.4}", metrics.accuracy)));
        line_box(&kv("Macro F1    ", &format!("{:.4}", metrics.f1_score)));
        if let Some(auc) = metrics.auc_roc {
            line_box(&kv("ROC-AUC     ", &format!("{:.4}", auc)));
        }
    }
    line_box_empty();
    line_box_bottom();

    println!();
    println!("  {:<22} {:<14} {:>10} {:>10}", muted("Family"), muted("State"), muted("CV"), muted("Test"));
    println!("  {}", dim(&"─".repeat(58)));
    for candidate in &selection.candidates {
        let cv = candidate.cv_score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string());
        let test = candidate
            .test_metrics
            .as_ref()
            .map(|m| format!("{:.4}", m.accuracy))
            .unwrap_or_else(|| "-".to_string());
        let state = candidate.state.to_string();
        let state = if candidate.failure.is_some() { state.red() } else { state.normal() };
        println!("  {:<22} {:<14} {:>10} {:>10}", candidate.family, state, cv, test);
    }
    println!();
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let artifact = TrainedArtifact::load(model_path)?;
    step_done(&format!(
        "{} {}",
        artifact.metadata.family,
        dim(&artifact.metadata.created_at.format("%Y-%m-%d %H:%M").to_string())
    ));

    let schema = artifact.input_schema.iter().fold(SchemaSpec::new(), |spec, (name, kind)| match kind {
        ColumnKind::Categorical => spec.with_categorical([name.clone()]),
        ColumnKind::Numeric => spec.with_numeric([name.clone()]),
    });

    step_run("Loading data");
    let dataset = load_csv(data_path, &schema)?;
    step_done(&format!("{} rows", dataset.n_rows()));

    step_run("Predicting");
    let start = Instant::now();
    let predictions = artifact.predict_dataset(&dataset)?;
    step_done(&format!("{:?}", start.elapsed()));

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in &predictions {
        *counts.entry(label.as_str()).or_insert(0) += 1;
    }
    println!();
    for (label, count) in &counts {
        println!("  {:<24} {:>8}", muted(label), count);
    }

    if let Some(path) = output {
        step_run(&format!("Saving → {}", path.display()));
        write_predictions(&dataset, predictions, path)?;
        step_done("");
    }

    println!();
    Ok(())
}

fn write_predictions(dataset: &Dataset, predictions: Vec<String>, path: &Path) -> anyhow::Result<()> {
    let mut df = dataset.frame().clone();
    df.with_column(Series::new("prediction".into(), predictions))?;
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let dataset = load_csv(data_path, &SchemaSpec::new())?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), dataset.n_rows());
    println!("  {:<12} {}", muted("Columns"), dataset.n_cols());
    println!();

    println!("  {:<24} {:<12} {:>8} {:>8}", muted("Column"), muted("Kind"), muted("Missing"), muted("Unique"));
    println!("  {}", dim(&"─".repeat(56)));

    for column in dataset.columns() {
        let unique = column.series().drop_nulls().n_unique()?;
        println!(
            "  {:<24} {:<12} {:>8} {:>8}",
            column.name(),
            column.kind().to_string().truecolor(140, 140, 140),
            column.missing_count(),
            unique
        );
    }

    println!();
    Ok(())
}
