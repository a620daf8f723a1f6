use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use market_data_ingestor::models::period::Period;
use price_forecast::{
    config::{PipelineConfig, load_config_path},
    pipeline::ForecastPipeline,
    regressor::RegressorKind,
};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(version, about = "Daily price forecasting CLI")]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Fit and persist a model for one ticker.
    Train(TrainArgs),
    /// Forecast the next days for a trained ticker.
    Predict(PredictArgs),
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long)]
    ticker: String,
    #[arg(long)]
    period: Option<Period>,
    #[arg(long)]
    sequence_length: Option<usize>,
    #[arg(long)]
    regressor: Option<RegressorKind>,
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct PredictArgs {
    #[arg(long)]
    ticker: String,
    #[arg(long)]
    days: Option<usize>,
    #[arg(long)]
    pretty: bool,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("price_forecast=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("failed to serialize report")?;
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => load_config_path(path)?,
        None => PipelineConfig::default(),
    };

    match cli.cmd {
        Cmd::Train(args) => {
            if let Some(period) = args.period {
                cfg.training.period = period;
            }
            if let Some(l) = args.sequence_length {
                cfg.training.sequence_length = l;
            }
            if let Some(kind) = args.regressor {
                cfg.training.regressor = kind;
            }
            cfg.validate()?;

            let source = cfg.source.build()?;
            let pipeline = ForecastPipeline::from_config(&cfg);
            let report = pipeline
                .train(&args.ticker, source.as_ref(), &cfg.training)
                .await
                .with_context(|| format!("training {} failed", args.ticker))?;
            print_json(&report, args.pretty)?;
        }
        Cmd::Predict(args) => {
            if let Some(days) = args.days {
                cfg.prediction.horizon = days;
            }
            cfg.validate()?;

            let source = cfg.source.build()?;
            let pipeline = ForecastPipeline::from_config(&cfg);
            let report = pipeline
                .predict(&args.ticker, cfg.prediction.horizon, source.as_ref())
                .await
                .with_context(|| format!("forecast for {} failed", args.ticker))?;
            print_json(&report, args.pretty)?;
        }
    }

    Ok(())
}
