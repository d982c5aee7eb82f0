//! Report aggregate and the pure builder that produces it.
//!
//! `ReportBuilder::build` merges one cost snapshot and one idle-resource scan
//! into the versioned daily report: trend against the previous window, ranked
//! recommendations, and the summary block. No I/O happens here; everything is
//! a deterministic function of its inputs and the configured thresholds.

pub mod pricing;

pub use pricing::PricingTable;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cost::{round_cents, CostForecast, CostSnapshot, DailyCost};
use crate::error::{Error, Result};
use crate::scanner::{IdleCategory, IdleResourceSet};

/// Direction of spend movement between the two compared windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Spend comparison between the reporting window and the adjacent
/// previous window of the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub current_period: f64,
    pub previous_period: f64,
    pub delta_absolute: f64,
    /// Undefined (not zero) when the previous period had no spend.
    pub delta_percent: Option<f64>,
    pub trend: TrendDirection,
}

impl Trend {
    /// Pure function of the two totals and the stability threshold.
    pub fn compute(current: f64, previous: f64, stability_percent: f64) -> Self {
        let delta_absolute = round_cents(current - previous);
        let delta_percent = if previous > 0.0 {
            Some(round_cents((current - previous) / previous * 100.0))
        } else {
            None
        };
        let trend = match delta_percent {
            None if current > 0.0 => TrendDirection::Increasing,
            None => TrendDirection::Stable,
            Some(pct) if pct.abs() < stability_percent => TrendDirection::Stable,
            Some(pct) if pct > 0.0 => TrendDirection::Increasing,
            Some(_) => TrendDirection::Decreasing,
        };
        Self {
            current_period: round_cents(current),
            previous_period: round_cents(previous),
            delta_absolute,
            delta_percent,
            trend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

/// One actionable finding, ranked by estimated monthly impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    /// Estimated monthly impact in the report currency. Advisory heuristic,
    /// not a billed amount.
    pub impact: f64,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_cost: f64,
    pub idle_resources_count: usize,
    pub potential_savings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostData {
    pub total_cost: f64,
    pub daily_costs: Vec<DailyCost>,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBreakdown {
    pub services: BTreeMap<String, f64>,
    /// Set when the per-service values do not reconcile with the total.
    #[serde(default, skip_serializing_if = "is_false")]
    pub partial: bool,
}

fn is_false(value: &bool) -> bool {
    !value
}

/// The aggregate root. Immutable once built; exactly one per pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub date: NaiveDate,
    pub environment: String,
    pub summary: Summary,
    pub cost_data: CostData,
    pub service_breakdown: ServiceBreakdown,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tag_breakdown: BTreeMap<String, f64>,
    pub idle_resources: IdleResourceSet,
    pub trends: Trend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<CostForecast>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone)]
pub struct ReportThresholds {
    /// |delta_percent| below this reads as stable.
    pub stability_percent: f64,
    /// A stopped-EC2 recommendation is HIGH above this monthly impact.
    pub ec2_high_priority_impact: f64,
    /// Services above this period cost get a cost-review recommendation.
    pub service_review_cost: f64,
}

impl Default for ReportThresholds {
    fn default() -> Self {
        Self {
            stability_percent: 1.0,
            ec2_high_priority_impact: 20.0,
            service_review_cost: 100.0,
        }
    }
}

/// How many top services are considered for cost-review recommendations.
const SERVICE_REVIEW_TOP_N: usize = 3;

/// Slack allowed between the service breakdown sum and the period total
/// before the breakdown is marked partial (a cent per entry covers rounding;
/// a missing "Other" bucket shows up well beyond it).
fn breakdown_epsilon(service_count: usize) -> f64 {
    0.01 * (service_count as f64 + 1.0)
}

pub struct ReportBuilder {
    thresholds: ReportThresholds,
    pricing: PricingTable,
}

impl ReportBuilder {
    pub fn new(thresholds: ReportThresholds, pricing: PricingTable) -> Self {
        Self {
            thresholds,
            pricing,
        }
    }

    /// Merge one run's inputs into the report.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        snapshot: CostSnapshot,
        resources: IdleResourceSet,
        previous_total: f64,
        forecast: Option<CostForecast>,
        environment: &str,
        date: NaiveDate,
        generated_at: DateTime<Utc>,
    ) -> Result<Report> {
        if environment.trim().is_empty() {
            return Err(Error::InvalidInput("environment name is empty".into()));
        }
        if snapshot.total_cost < 0.0 {
            return Err(Error::InvalidInput(format!(
                "total cost may not be negative, got {}",
                snapshot.total_cost
            )));
        }
        if previous_total < 0.0 {
            return Err(Error::InvalidInput(format!(
                "previous-period total may not be negative, got {previous_total}"
            )));
        }
        if let Some((service, cost)) = snapshot.services.iter().find(|(_, c)| **c < 0.0) {
            return Err(Error::InvalidInput(format!(
                "service cost for {service} is negative: {cost}"
            )));
        }

        let trends = Trend::compute(
            snapshot.total_cost,
            previous_total,
            self.thresholds.stability_percent,
        );
        let recommendations = self.recommendations(&resources, &snapshot.services);
        let potential_savings = round_cents(self.pricing.total_impact(&resources));

        let breakdown_sum: f64 = snapshot.services.values().sum();
        let partial = (breakdown_sum - snapshot.total_cost).abs()
            > breakdown_epsilon(snapshot.services.len());

        Ok(Report {
            timestamp: generated_at.to_rfc3339(),
            date,
            environment: environment.to_string(),
            summary: Summary {
                total_cost: snapshot.total_cost,
                idle_resources_count: resources.total_count(),
                potential_savings,
            },
            cost_data: CostData {
                total_cost: snapshot.total_cost,
                daily_costs: snapshot.daily_costs,
                currency: snapshot.currency,
            },
            service_breakdown: ServiceBreakdown {
                services: snapshot.services,
                partial,
            },
            tag_breakdown: snapshot.tags,
            idle_resources: resources,
            trends,
            forecast,
            recommendations,
        })
    }

    /// One entry per non-empty idle category, plus cost-review entries for
    /// the highest-spend services, ranked by impact.
    fn recommendations(
        &self,
        resources: &IdleResourceSet,
        services: &BTreeMap<String, f64>,
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();

        for category in IdleCategory::ALL {
            let count = resources.count(category);
            if count == 0 {
                continue;
            }
            let impact = round_cents(self.pricing.category_impact(resources, category));
            let priority = if category == IdleCategory::Ec2Stopped
                && impact > self.thresholds.ec2_high_priority_impact
            {
                Priority::High
            } else {
                Priority::Medium
            };
            let (title, action) = describe(category, count);
            out.push(Recommendation {
                priority,
                category: category.recommendation_category().to_string(),
                title,
                impact,
                action,
            });
        }

        let mut ranked_services: Vec<(&String, &f64)> = services.iter().collect();
        ranked_services.sort_by(|a, b| b.1.total_cmp(a.1));
        for (service, cost) in ranked_services.into_iter().take(SERVICE_REVIEW_TOP_N) {
            if *cost <= self.thresholds.service_review_cost {
                continue;
            }
            out.push(Recommendation {
                priority: Priority::Medium,
                category: "Cost Review".to_string(),
                title: format!("Review {service} spending (${cost:.2}/month)"),
                impact: round_cents(*cost),
                action: format!("Analyze {service} usage patterns for optimization opportunities"),
            });
        }

        sort_recommendations(&mut out);
        out
    }
}

/// Descending impact, then priority rank, then category name ascending.
pub(crate) fn sort_recommendations(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.impact
            .total_cmp(&a.impact)
            .then_with(|| a.priority.rank().cmp(&b.priority.rank()))
            .then_with(|| a.category.cmp(&b.category))
    });
}

fn describe(category: IdleCategory, count: usize) -> (String, String) {
    match category {
        IdleCategory::Ec2Stopped => (
            format!("Terminate {count} stopped EC2 instances"),
            "Review and terminate unused instances or convert to reserved instances".to_string(),
        ),
        IdleCategory::EbsUnattached => (
            format!("Delete {count} unattached EBS volumes"),
            "Create snapshots if needed, then delete volumes".to_string(),
        ),
        IdleCategory::EipUnassociated => (
            format!("Release {count} unassociated Elastic IPs"),
            "Release unused Elastic IPs immediately".to_string(),
        ),
        IdleCategory::RdsStopped => (
            format!("Retire {count} stopped RDS instances"),
            "Take a final snapshot, then delete instances that stay stopped".to_string(),
        ),
        IdleCategory::ElbUnused => (
            format!("Remove {count} load balancers with no healthy targets"),
            "Delete load balancers whose target groups are empty or unhealthy".to_string(),
        ),
    }
}
