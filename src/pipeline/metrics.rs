//! Best-effort CloudWatch metrics for each pipeline run.
//!
//! A failed publish is logged and swallowed; metrics never fail the run.

use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use tracing::{debug, warn};

use crate::report::Report;

pub struct MetricsEmitter {
    client: aws_sdk_cloudwatch::Client,
    namespace: String,
}

impl MetricsEmitter {
    pub fn new(sdk_config: &aws_config::SdkConfig, namespace: String) -> Self {
        Self {
            client: aws_sdk_cloudwatch::Client::new(sdk_config),
            namespace,
        }
    }

    /// Publish the run's headline numbers under one environment dimension.
    pub async fn publish(&self, report: &Report) {
        let dimension = Dimension::builder()
            .name("Environment")
            .value(&report.environment)
            .build();
        let datum = |name: &str, value: f64, unit: StandardUnit| {
            MetricDatum::builder()
                .metric_name(name)
                .value(value)
                .unit(unit)
                .dimensions(dimension.clone())
                .build()
        };

        let result = self
            .client
            .put_metric_data()
            .namespace(&self.namespace)
            .metric_data(datum(
                "TotalDailyCost",
                report.summary.total_cost,
                StandardUnit::None,
            ))
            .metric_data(datum(
                "IdleResourcesCount",
                report.summary.idle_resources_count as f64,
                StandardUnit::Count,
            ))
            .metric_data(datum(
                "PotentialSavings",
                report.summary.potential_savings,
                StandardUnit::None,
            ))
            .send()
            .await;

        match result {
            Ok(_) => debug!(namespace = %self.namespace, "metrics published"),
            Err(e) => warn!(
                namespace = %self.namespace,
                error = %e.into_service_error(),
                "metrics publish failed, continuing"
            ),
        }
    }
}
