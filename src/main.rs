use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use costwatch::config::Config;
use costwatch::cost::explorer::CostExplorerSource;
use costwatch::pipeline::{MetricsEmitter, Pipeline};
use costwatch::report::{ReportBuilder, ReportThresholds};
use costwatch::scanner::aws::AwsInventory;
use costwatch::store::{FsReportStore, ReportStore, S3ReportStore};

#[derive(Parser, Debug)]
#[command(name = "costwatch")]
#[command(author, version, about = "AWS cost and idle-resource reporting", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "costwatch.toml")]
    config: PathBuf,

    /// S3 bucket for persisted reports
    #[arg(long, env = "COST_DATA_BUCKET")]
    bucket: Option<String>,

    /// Environment label stamped into the report
    #[arg(short, long, env = "ENVIRONMENT")]
    environment: Option<String>,

    /// Report date (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Write reports to a local directory instead of S3
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;
    if cli.bucket.is_some() {
        config.storage.bucket = cli.bucket.clone();
    }
    if cli.local_dir.is_some() {
        config.storage.local_dir = cli.local_dir.clone();
    }
    if let Some(environment) = &cli.environment {
        config.report.environment = environment.clone();
    }

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting costwatch v{}", env!("CARGO_PKG_VERSION"));

    let timeout = Duration::from_secs(config.aws.timeout_secs);
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let store: Arc<dyn ReportStore> = match (&config.storage.local_dir, &config.storage.bucket) {
        (Some(dir), _) => Arc::new(FsReportStore::new(dir.clone())),
        (None, Some(bucket)) => {
            Arc::new(S3ReportStore::new(&sdk_config, bucket.clone(), timeout))
        }
        (None, None) => {
            anyhow::bail!(
                "no report destination configured: set storage.bucket or storage.local_dir"
            )
        }
    };

    let metrics = config
        .metrics
        .enabled
        .then(|| MetricsEmitter::new(&sdk_config, config.metrics.namespace.clone()));

    let builder = ReportBuilder::new(
        ReportThresholds {
            stability_percent: config.report.stability_threshold_percent,
            ec2_high_priority_impact: config.report.ec2_high_priority_impact,
            service_review_cost: config.report.service_review_cost,
        },
        config.pricing.clone(),
    );

    let pipeline = Pipeline::new(
        Arc::new(CostExplorerSource::new(&sdk_config, timeout)),
        Arc::new(AwsInventory::new(&sdk_config, timeout)),
        store,
        builder,
        metrics,
        config.report.environment.clone(),
        config.report.lookback_days,
        config.report.tag_key.clone(),
    );

    let now = Utc::now();
    let date = cli.date.unwrap_or_else(|| now.date_naive());
    let result = pipeline.run(date, now).await;

    println!("{}", result.body);
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
