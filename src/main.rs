//! Injury Severity - Main Entry Point
//!
//! Train, apply and inspect injury-severity classifiers from the command line.

use clap::Parser;
use injury_severity::cli::{cmd_info, cmd_predict, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "injury_severity=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            target,
            config,
            preset,
            quick,
            n_jobs,
            output,
            format,
            report,
            categorical,
        } => {
            cmd_train(
                &data,
                target.as_deref(),
                config.as_deref(),
                preset,
                quick,
                n_jobs,
                &output,
                format.as_deref(),
                report.as_deref(),
                categorical,
            )?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
