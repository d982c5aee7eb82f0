//! One end-to-end pipeline run: fetch billing data and scan inventory in
//! parallel, build the report, persist it, then publish metrics.
//!
//! Cost-data and storage failures abort the run; scan failures degrade the
//! report and metrics are fire-and-forget.

pub mod metrics;

pub use metrics::MetricsEmitter;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use crate::cost::{CostDataSource, CostSnapshot, ReportPeriod};
use crate::error::{Error, Result};
use crate::report::ReportBuilder;
use crate::scanner::{scan_all, InventorySource};
use crate::store::ReportStore;

/// Terminal outcome of a run, shaped for the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResult {
    fn success(body: serde_json::Value) -> Self {
        Self {
            status_code: 200,
            body: body.to_string(),
        }
    }

    fn failure(error: &Error) -> Self {
        Self {
            status_code: error.status_code(),
            body: json!({ "error": error.to_string() }).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }
}

pub struct Pipeline {
    cost: Arc<dyn CostDataSource>,
    inventory: Arc<dyn InventorySource>,
    store: Arc<dyn ReportStore>,
    builder: ReportBuilder,
    metrics: Option<MetricsEmitter>,
    environment: String,
    lookback_days: i64,
    tag_key: Option<String>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cost: Arc<dyn CostDataSource>,
        inventory: Arc<dyn InventorySource>,
        store: Arc<dyn ReportStore>,
        builder: ReportBuilder,
        metrics: Option<MetricsEmitter>,
        environment: String,
        lookback_days: i64,
        tag_key: Option<String>,
    ) -> Self {
        Self {
            cost,
            inventory,
            store,
            builder,
            metrics,
            environment,
            lookback_days,
            tag_key,
        }
    }

    /// Run for `date` (the report date, normally today) and fold any error
    /// into the invocation result.
    pub async fn run(&self, date: NaiveDate, now: DateTime<Utc>) -> InvocationResult {
        match self.execute(date, now).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "pipeline run failed");
                InvocationResult::failure(&e)
            }
        }
    }

    async fn execute(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<InvocationResult> {
        let period = ReportPeriod::ending(date, self.lookback_days)?;
        info!(
            environment = %self.environment,
            start = %period.start,
            end = %period.end,
            store = %self.store.describe(),
            "pipeline run starting"
        );

        let (snapshot_result, previous_result, forecast, scan) = tokio::join!(
            self.snapshot(&period),
            self.cost.period_total(&period.previous()),
            self.cost.cost_forecast(&period),
            scan_all(self.inventory.as_ref()),
        );
        let snapshot = snapshot_result?;
        let previous_total = previous_result?;
        for failure in &scan.failures {
            warn!(category = %failure.category, reason = %failure.reason, "scan degraded");
        }

        let report = self.builder.build(
            snapshot,
            scan.resources,
            previous_total,
            forecast,
            &self.environment,
            date,
            now,
        )?;
        let locator = self.store.put(&report).await?;

        if let Some(metrics) = &self.metrics {
            metrics.publish(&report).await;
        }

        info!(
            total_cost = report.summary.total_cost,
            idle_resources = report.summary.idle_resources_count,
            potential_savings = report.summary.potential_savings,
            key = %locator.key,
            "pipeline run complete"
        );
        Ok(InvocationResult::success(json!({
            "date": report.date.to_string(),
            "total_cost": report.summary.total_cost,
            "idle_resources_count": report.summary.idle_resources_count,
            "report_location": format!("{}/{}", self.store.describe(), locator.key),
        })))
    }

    async fn snapshot(&self, period: &ReportPeriod) -> Result<CostSnapshot> {
        let usage = self.cost.cost_and_usage(period).await?;
        // The tag breakdown is optional; a failing provider costs us the
        // section, never the run.
        let tags = match &self.tag_key {
            Some(key) => match self.cost.cost_by_tag(period, key).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(tag_key = %key, error = %e, "Tag breakdown unavailable, continuing without it");
                    Default::default()
                }
            },
            None => Default::default(),
        };
        Ok(CostSnapshot {
            period: *period,
            total_cost: usage.total_cost,
            currency: usage.currency,
            daily_costs: usage.daily_costs,
            services: usage.services,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{CostForecast, CostUsage, DailyCost};
    use crate::error::Result;
    use crate::report::{PricingTable, Report, ReportThresholds};
    use crate::scanner::StoppedInstance;
    use crate::store::{DateRange, StoredReportLocator};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCost {
        fail: bool,
        fail_tags: bool,
    }

    #[async_trait]
    impl CostDataSource for FakeCost {
        async fn cost_and_usage(&self, period: &ReportPeriod) -> Result<CostUsage> {
            if self.fail {
                return Err(Error::RemoteDataUnavailable("billing API offline".into()));
            }
            Ok(CostUsage {
                total_cost: 245.32,
                daily_costs: vec![DailyCost {
                    date: period.start,
                    cost: 245.32,
                }],
                currency: "USD".to_string(),
                services: BTreeMap::from([("AmazonEC2".to_string(), 245.32)]),
            })
        }

        async fn period_total(&self, _period: &ReportPeriod) -> Result<f64> {
            Ok(280.45)
        }

        async fn cost_by_tag(
            &self,
            _period: &ReportPeriod,
            _tag_key: &str,
        ) -> Result<BTreeMap<String, f64>> {
            if self.fail_tags {
                return Err(Error::RemoteDataUnavailable("tag key not activated".into()));
            }
            Ok(BTreeMap::from([("platform".to_string(), 245.32)]))
        }

        async fn cost_forecast(&self, _period: &ReportPeriod) -> Option<CostForecast> {
            None
        }
    }

    struct FakeInventory {
        fail_volumes: bool,
    }

    #[async_trait]
    impl InventorySource for FakeInventory {
        async fn stopped_instances(&self) -> Result<Vec<StoppedInstance>> {
            Ok(vec![StoppedInstance {
                id: "i-1".to_string(),
                instance_type: "t3.large".to_string(),
                name: None,
                environment: None,
                launch_time: None,
            }])
        }

        async fn unattached_volumes(&self) -> Result<Vec<crate::scanner::UnattachedVolume>> {
            if self.fail_volumes {
                return Err(Error::RemoteDataUnavailable("ec2 throttled".into()));
            }
            Ok(Vec::new())
        }

        async fn unassociated_addresses(
            &self,
        ) -> Result<Vec<crate::scanner::UnassociatedAddress>> {
            Ok(Vec::new())
        }

        async fn stopped_databases(&self) -> Result<Vec<crate::scanner::StoppedDatabase>> {
            Ok(Vec::new())
        }

        async fn unused_load_balancers(&self) -> Result<Vec<crate::scanner::UnusedLoadBalancer>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        reports: Mutex<Vec<Report>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportStore for MemoryStore {
        async fn put(&self, report: &Report) -> Result<StoredReportLocator> {
            if self.fail {
                return Err(Error::StorageUnavailable("bucket gone".into()));
            }
            self.reports.lock().unwrap().push(report.clone());
            Ok(StoredReportLocator::for_date(report.date))
        }

        async fn get(&self, _date: Option<NaiveDate>) -> Result<Report> {
            Err(Error::NotFound("not stored".into()))
        }

        async fn list(&self, _range: DateRange) -> Result<Vec<StoredReportLocator>> {
            Ok(Vec::new())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    fn pipeline(
        cost_fail: bool,
        volumes_fail: bool,
        store: Arc<MemoryStore>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(FakeCost {
                fail: cost_fail,
                ..Default::default()
            }),
            Arc::new(FakeInventory {
                fail_volumes: volumes_fail,
            }),
            store,
            ReportBuilder::new(ReportThresholds::default(), PricingTable::default()),
            None,
            "test".to_string(),
            30,
            None,
        )
    }

    #[tokio::test]
    async fn test_successful_run_persists_one_report() {
        let store = Arc::new(MemoryStore::default());
        let result = pipeline(false, false, store.clone())
            .run("2025-08-30".parse().unwrap(), Utc::now())
            .await;

        assert_eq!(result.status_code, 200);
        let body: serde_json::Value = serde_json::from_str(&result.body).unwrap();
        assert_eq!(body["total_cost"], 245.32);
        assert_eq!(body["idle_resources_count"], 1);
        assert!(body["report_location"]
            .as_str()
            .unwrap()
            .starts_with("memory/reports/year=2025/"));

        let stored = store.reports.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].trends.delta_percent, Some(-12.53));
    }

    #[tokio::test]
    async fn test_scan_failure_degrades_but_run_succeeds() {
        let store = Arc::new(MemoryStore::default());
        let result = pipeline(false, true, store.clone())
            .run("2025-08-30".parse().unwrap(), Utc::now())
            .await;

        assert_eq!(result.status_code, 200);
        let stored = store.reports.lock().unwrap();
        assert_eq!(stored[0].idle_resources.ec2_stopped.len(), 1);
        assert!(stored[0].idle_resources.ebs_unattached.is_empty());
    }

    fn pipeline_with_tag_key(cost: FakeCost, store: Arc<MemoryStore>) -> Pipeline {
        Pipeline::new(
            Arc::new(cost),
            Arc::new(FakeInventory {
                fail_volumes: false,
            }),
            store,
            ReportBuilder::new(ReportThresholds::default(), PricingTable::default()),
            None,
            "test".to_string(),
            30,
            Some("Team".to_string()),
        )
    }

    #[tokio::test]
    async fn test_tag_query_failure_drops_section_not_run() {
        let store = Arc::new(MemoryStore::default());
        let result = pipeline_with_tag_key(
            FakeCost {
                fail_tags: true,
                ..Default::default()
            },
            store.clone(),
        )
        .run("2025-08-30".parse().unwrap(), Utc::now())
        .await;

        assert_eq!(result.status_code, 200);
        let stored = store.reports.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].tag_breakdown.is_empty());
    }

    #[tokio::test]
    async fn test_tag_breakdown_carried_when_query_succeeds() {
        let store = Arc::new(MemoryStore::default());
        let result = pipeline_with_tag_key(FakeCost::default(), store.clone())
            .run("2025-08-30".parse().unwrap(), Utc::now())
            .await;

        assert_eq!(result.status_code, 200);
        let stored = store.reports.lock().unwrap();
        assert_eq!(stored[0].tag_breakdown.get("platform"), Some(&245.32));
    }

    #[tokio::test]
    async fn test_cost_failure_aborts_before_persisting() {
        let store = Arc::new(MemoryStore::default());
        let result = pipeline(true, false, store.clone())
            .run("2025-08-30".parse().unwrap(), Utc::now())
            .await;

        assert_eq!(result.status_code, 503);
        assert!(result.body.contains("billing API offline"));
        assert!(store.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_maps_to_503() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..Default::default()
        });
        let result = pipeline(false, false, store)
            .run("2025-08-30".parse().unwrap(), Utc::now())
            .await;

        assert_eq!(result.status_code, 503);
        assert!(result.body.contains("bucket gone"));
    }
}
