use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::report::pricing::PricingTable;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pricing: PricingTable,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    /// S3 bucket for persisted reports. Required unless `local_dir` is set.
    pub bucket: Option<String>,
    /// Local directory sink instead of S3 (development and backfill dry runs).
    pub local_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Length of the reporting window in days, ending at the report date.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    /// Cost-allocation tag key to break costs down by, if the account has one.
    pub tag_key: Option<String>,
    /// |delta_percent| below this reads as a stable trend.
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold_percent: f64,
    /// Stopped-EC2 recommendations escalate to HIGH above this monthly impact.
    #[serde(default = "default_ec2_high_priority_impact")]
    pub ec2_high_priority_impact: f64,
    /// Services costing more than this per period get a cost-review entry.
    #[serde(default = "default_service_review_cost")]
    pub service_review_cost: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            lookback_days: default_lookback_days(),
            tag_key: None,
            stability_threshold_percent: default_stability_threshold(),
            ec2_high_priority_impact: default_ec2_high_priority_impact(),
            service_review_cost: default_service_review_cost(),
        }
    }
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_lookback_days() -> i64 {
    30
}

fn default_stability_threshold() -> f64 {
    1.0
}

fn default_ec2_high_priority_impact() -> f64 {
    20.0
}

fn default_service_review_cost() -> f64 {
    100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    /// Upper bound for any single external call, in seconds. Aligned with the
    /// platform invocation deadline so no call can outlive the run.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Publish summary metrics to CloudWatch after a successful run.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_namespace")]
    pub namespace: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            namespace: default_metrics_namespace(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_namespace() -> String {
    "CostOptimizer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
