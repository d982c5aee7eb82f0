//! Cost Explorer implementation of [`CostDataSource`].
//!
//! One DAILY query grouped by SERVICE feeds both the daily spend series and
//! the per-service breakdown; the previous-period total is a separate
//! ungrouped MONTHLY query. Tag breakdown and forecast are best-effort and
//! degrade without failing the run.

use async_trait::async_trait;
use aws_sdk_costexplorer::types::{
    DateInterval, Granularity, GroupDefinition, GroupDefinitionType, Metric, MetricValue,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{round_cents, CostDataSource, CostForecast, CostUsage, DailyCost, ReportPeriod};
use crate::error::{Error, Result};

/// Per-service amounts are kept only when strictly above this floor.
const MIN_SERVICE_COST: f64 = 0.01;

pub struct CostExplorerSource {
    client: aws_sdk_costexplorer::Client,
    timeout: Duration,
}

impl CostExplorerSource {
    pub fn new(sdk_config: &aws_config::SdkConfig, timeout: Duration) -> Self {
        Self {
            client: aws_sdk_costexplorer::Client::new(sdk_config),
            timeout,
        }
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::RemoteDataUnavailable(format!(
                "{what} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl CostDataSource for CostExplorerSource {
    async fn cost_and_usage(&self, period: &ReportPeriod) -> Result<CostUsage> {
        let interval = interval(period)?;

        self.bounded("cost and usage query", async {
            let mut daily: Vec<DailyCost> = Vec::new();
            let mut services: BTreeMap<String, f64> = BTreeMap::new();
            let mut total_cost = 0.0;
            let mut currency: Option<String> = None;
            let mut next_token: Option<String> = None;

            loop {
                let output = self
                    .client
                    .get_cost_and_usage()
                    .time_period(interval.clone())
                    .granularity(Granularity::Daily)
                    .metrics("UnblendedCost")
                    .group_by(
                        GroupDefinition::builder()
                            .r#type(GroupDefinitionType::Dimension)
                            .key("SERVICE")
                            .build(),
                    )
                    .set_next_page_token(next_token.take())
                    .send()
                    .await
                    .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;

                for result in output.results_by_time() {
                    let mut day_cost = 0.0;
                    for group in result.groups() {
                        let amount = parse_amount(group.metrics().and_then(|m| m.get("UnblendedCost")));
                        if currency.is_none() {
                            currency = group
                                .metrics()
                                .and_then(|m| m.get("UnblendedCost"))
                                .and_then(|v| v.unit())
                                .map(str::to_string);
                        }
                        day_cost += amount;
                        if let Some(service) = group.keys().first() {
                            *services.entry(service.clone()).or_insert(0.0) += amount;
                        }
                    }
                    total_cost += day_cost;
                    if let Some(date) = result
                        .time_period()
                        .and_then(|p| p.start().parse::<NaiveDate>().ok())
                    {
                        daily.push(DailyCost {
                            date,
                            cost: round_cents(day_cost),
                        });
                    }
                }

                next_token = output.next_page_token().map(str::to_string);
                if next_token.is_none() {
                    break;
                }
            }

            if daily.is_empty() {
                // Billing data lags up to 24 hours after account provisioning;
                // the scheduler retries the whole run later.
                return Err(Error::RemoteDataUnavailable(format!(
                    "billing API returned no rows for {} to {}",
                    period.start, period.end
                )));
            }

            let services: BTreeMap<String, f64> = services
                .into_iter()
                .map(|(name, cost)| (name, round_cents(cost)))
                .filter(|(_, cost)| *cost > MIN_SERVICE_COST)
                .collect();

            debug!(
                total_cost = round_cents(total_cost),
                services = services.len(),
                days = daily.len(),
                "Fetched cost and usage"
            );

            Ok(CostUsage {
                total_cost: round_cents(total_cost),
                daily_costs: daily,
                currency: currency.unwrap_or_else(|| "USD".to_string()),
                services,
            })
        })
        .await
    }

    async fn period_total(&self, period: &ReportPeriod) -> Result<f64> {
        let interval = interval(period)?;

        self.bounded("period total query", async {
            let output = self
                .client
                .get_cost_and_usage()
                .time_period(interval)
                .granularity(Granularity::Monthly)
                .metrics("UnblendedCost")
                .send()
                .await
                .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;

            let mut total = 0.0;
            for result in output.results_by_time() {
                total += parse_amount(result.total().and_then(|t| t.get("UnblendedCost")));
            }
            Ok(round_cents(total))
        })
        .await
    }

    async fn cost_by_tag(
        &self,
        period: &ReportPeriod,
        tag_key: &str,
    ) -> Result<BTreeMap<String, f64>> {
        let interval = interval(period)?;

        let fetched = self
            .bounded("cost by tag query", async {
                let output = self
                    .client
                    .get_cost_and_usage()
                    .time_period(interval)
                    .granularity(Granularity::Monthly)
                    .metrics("UnblendedCost")
                    .group_by(
                        GroupDefinition::builder()
                            .r#type(GroupDefinitionType::Tag)
                            .key(tag_key)
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;

                let mut tags: BTreeMap<String, f64> = BTreeMap::new();
                for result in output.results_by_time() {
                    for group in result.groups() {
                        let amount = parse_amount(group.metrics().and_then(|m| m.get("UnblendedCost")));
                        if let Some(key) = group.keys().first() {
                            *tags.entry(strip_tag_prefix(key, tag_key)).or_insert(0.0) += amount;
                        }
                    }
                }
                Ok(tags
                    .into_iter()
                    .map(|(tag, cost)| (tag, round_cents(cost)))
                    .filter(|(_, cost)| *cost > MIN_SERVICE_COST)
                    .collect())
            })
            .await;

        // Accounts without tag activations error here; the breakdown is
        // optional so the run carries on with an empty map.
        match fetched {
            Ok(tags) => Ok(tags),
            Err(e) => {
                warn!(tag_key = %tag_key, error = %e, "Cost-by-tag query failed, continuing without breakdown");
                Ok(BTreeMap::new())
            }
        }
    }

    async fn cost_forecast(&self, period: &ReportPeriod) -> Option<CostForecast> {
        let forecast_period = ReportPeriod::ending(period.end + chrono::Duration::days(30), 30).ok()?;
        let interval = interval(&forecast_period).ok()?;

        let fetched = self
            .bounded("cost forecast query", async {
                self.client
                    .get_cost_forecast()
                    .time_period(interval)
                    .metric(Metric::UnblendedCost)
                    .granularity(Granularity::Monthly)
                    .send()
                    .await
                    .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))
            })
            .await;

        match fetched {
            Ok(output) => Some(CostForecast {
                forecasted_cost: round_cents(parse_amount(output.total())),
                period_start: forecast_period.start,
                period_end: forecast_period.end,
            }),
            Err(e) => {
                // Forecasts only exist for windows starting today or later.
                warn!(error = %e, "Cost forecast unavailable");
                None
            }
        }
    }
}

fn interval(period: &ReportPeriod) -> Result<DateInterval> {
    DateInterval::builder()
        .start(period.start.to_string())
        .end(period.end.to_string())
        .build()
        .map_err(|e| Error::InvalidInput(format!("invalid billing interval: {e}")))
}

fn parse_amount(value: Option<&MetricValue>) -> f64 {
    value
        .and_then(|v| v.amount())
        .and_then(|a| a.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Grouped tag keys come back as `TagKey$value`; only the value matters.
fn strip_tag_prefix(key: &str, tag_key: &str) -> String {
    key.strip_prefix(tag_key)
        .and_then(|rest| rest.strip_prefix('$'))
        .unwrap_or(key)
        .to_string()
}
