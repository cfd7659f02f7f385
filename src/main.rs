use anyhow::Context;
use arbo_risk::{
    config::Config,
    data::{load_labeled, load_observations},
    reporting::{ExportFormat, ReportExporter},
    RiskService,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "arbo-risk")]
#[command(version, about = "Arbovirus outbreak risk from daily weather", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $ARBO_RISK_CONFIG or config/arbo-risk.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on labeled history and write risk reports
    Run {
        /// Labeled training CSV
        #[arg(short, long)]
        train: PathBuf,

        /// Observations to score (defaults to the training data)
        #[arg(short, long)]
        score: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Output format: json, csv, or both
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
    },

    /// Hold out the most recent data and report classifier and forecast accuracy
    Evaluate {
        /// Labeled CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Share of dates held out for testing
        #[arg(long)]
        test_size: Option<f64>,

        /// Days held out for the forecast backtest
        #[arg(long)]
        horizon: Option<usize>,

        /// Also write evaluation.json here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forecast per-city case counts
    Forecast {
        /// Observations CSV with a cases column
        #[arg(short, long)]
        data: PathBuf,

        /// Days past the end of the data
        #[arg(short, long)]
        periods: Option<usize>,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Output format: json, csv, or both
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config);

    tracing::info!("Starting arbo-risk v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            train,
            score,
            output,
            format,
        } => {
            let thresholds = config.risk.thresholds;
            let examples = load_labeled(&train, &thresholds)
                .with_context(|| format!("Failed to read {}", train.display()))?;

            let observations = match &score {
                Some(path) => load_observations(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => examples.iter().map(|e| e.observation.clone()).collect(),
            };

            let service = RiskService::new(config);
            let summary = service.train(examples).await?;
            let outcome = service.score(observations).await?;
            let forecast = service.forecast_points().await?;

            let exporter = ReportExporter::new(&output);
            exporter.export_reports(&outcome.reports, format).await?;
            exporter.export_summaries(&outcome.summaries).await?;
            exporter.write_json("training.json", &summary).await?;
            if !forecast.is_empty() {
                exporter.export_forecast(&forecast, format).await?;
            }

            for city in &outcome.summaries {
                println!(
                    "{:<24} latest {:<6} outlook {:<6} headline {}",
                    city.city,
                    city.latest_category.to_string(),
                    city.outlook.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
                    city.headline()
                );
            }
            tracing::info!(
                "✅ Wrote {} reports for {} cities to {}",
                outcome.reports.len(),
                outcome.summaries.len(),
                output.display()
            );
        }

        Commands::Evaluate {
            data,
            test_size,
            horizon,
            output,
        } => {
            if let Some(test_size) = test_size {
                config.evaluation.test_size = test_size;
            }
            if let Some(horizon) = horizon {
                config.evaluation.backtest_horizon = horizon;
            }
            config.validate_all()?;

            let examples = load_labeled(&data, &config.risk.thresholds)
                .with_context(|| format!("Failed to read {}", data.display()))?;

            let service = RiskService::new(config);
            let report = service.evaluate(examples).await?;

            if let Some(dir) = output {
                ReportExporter::new(dir)
                    .write_json("evaluation.json", &report)
                    .await?;
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Forecast {
            data,
            periods,
            output,
            format,
        } => {
            let observations = load_observations(&data)
                .with_context(|| format!("Failed to read {}", data.display()))?;
            let periods = periods.unwrap_or(config.forecaster.periods);

            let service = RiskService::new(config);
            let batch = service.forecast(observations, periods).await?;

            let exporter = ReportExporter::new(&output);
            exporter.export_forecast(&batch.points, format).await?;

            for skipped in &batch.skipped {
                tracing::warn!("⚠️  No forecast for {}: {}", skipped.city, skipped.reason);
            }
            tracing::info!(
                "✅ Wrote {} forecast points to {}",
                batch.points.len(),
                output.display()
            );
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("arbo_risk={}", config.observability.log_level).into());

    let json = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}
