//! Idle-resource model and the inventory capability trait.
//!
//! Five independent categories of waste: stopped EC2 instances, unattached
//! EBS volumes, unassociated Elastic IPs, stopped RDS instances, and load
//! balancers with no healthy targets. Each category scans on its own; one
//! failing scan degrades that category to empty and never unwinds the rest.

pub mod aws;

pub use aws::AwsInventory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

use crate::error::Result;

/// The five idle-resource categories, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleCategory {
    Ec2Stopped,
    EbsUnattached,
    EipUnassociated,
    RdsStopped,
    ElbUnused,
}

impl IdleCategory {
    pub const ALL: [IdleCategory; 5] = [
        IdleCategory::Ec2Stopped,
        IdleCategory::EbsUnattached,
        IdleCategory::EipUnassociated,
        IdleCategory::RdsStopped,
        IdleCategory::ElbUnused,
    ];

    /// Key used in the persisted report document.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdleCategory::Ec2Stopped => "ec2_stopped",
            IdleCategory::EbsUnattached => "ebs_unattached",
            IdleCategory::EipUnassociated => "eip_unassociated",
            IdleCategory::RdsStopped => "rds_stopped",
            IdleCategory::ElbUnused => "elb_unused",
        }
    }

    /// Recommendation category label; also the lexicographic tie-breaker
    /// when two recommendations have equal impact and priority.
    pub fn recommendation_category(&self) -> &'static str {
        match self {
            IdleCategory::Ec2Stopped => "Idle Resources",
            IdleCategory::EbsUnattached => "Storage Optimization",
            IdleCategory::EipUnassociated => "Network Optimization",
            IdleCategory::RdsStopped => "Database Optimization",
            IdleCategory::ElbUnused => "Load Balancing",
        }
    }
}

impl fmt::Display for IdleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EC2 instance sitting in the `stopped` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppedInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub name: Option<String>,
    pub environment: Option<String>,
    pub launch_time: Option<String>,
}

/// EBS volume with no attachment to any instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnattachedVolume {
    pub id: String,
    pub size_gb: i32,
    #[serde(rename = "type")]
    pub volume_type: String,
    pub name: Option<String>,
    pub created: Option<String>,
}

/// Elastic IP allocated but associated with nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassociatedAddress {
    pub allocation_id: String,
    pub public_ip: Option<String>,
    pub domain: Option<String>,
}

/// RDS instance sitting in the `stopped` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppedDatabase {
    pub id: String,
    pub instance_class: String,
    pub engine: String,
    pub storage_gb: i32,
}

/// Load balancer whose target groups have no healthy registered target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusedLoadBalancer {
    pub arn: String,
    pub name: String,
    #[serde(rename = "type")]
    pub lb_type: String,
    pub scheme: String,
}

/// The five category sequences, keyed the way the report document stores them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdleResourceSet {
    pub ec2_stopped: Vec<StoppedInstance>,
    pub ebs_unattached: Vec<UnattachedVolume>,
    pub eip_unassociated: Vec<UnassociatedAddress>,
    pub rds_stopped: Vec<StoppedDatabase>,
    pub elb_unused: Vec<UnusedLoadBalancer>,
}

impl IdleResourceSet {
    pub fn count(&self, category: IdleCategory) -> usize {
        match category {
            IdleCategory::Ec2Stopped => self.ec2_stopped.len(),
            IdleCategory::EbsUnattached => self.ebs_unattached.len(),
            IdleCategory::EipUnassociated => self.eip_unassociated.len(),
            IdleCategory::RdsStopped => self.rds_stopped.len(),
            IdleCategory::ElbUnused => self.elb_unused.len(),
        }
    }

    pub fn total_count(&self) -> usize {
        IdleCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }
}

/// One category's scan could not run (missing permission, API error).
/// Recorded for observability; the category reports as empty.
#[derive(Debug, Clone)]
pub struct ScanFailure {
    pub category: IdleCategory,
    pub reason: String,
}

/// Result of the five-way fan-out: whatever scanned cleanly, plus the
/// failures that were downgraded to empty categories.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub resources: IdleResourceSet,
    pub failures: Vec<ScanFailure>,
}

/// Read-only inventory access, one operation per idle category.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn stopped_instances(&self) -> Result<Vec<StoppedInstance>>;
    async fn unattached_volumes(&self) -> Result<Vec<UnattachedVolume>>;
    async fn unassociated_addresses(&self) -> Result<Vec<UnassociatedAddress>>;
    async fn stopped_databases(&self) -> Result<Vec<StoppedDatabase>>;
    async fn unused_load_balancers(&self) -> Result<Vec<UnusedLoadBalancer>>;
}

/// Fan out the five scans concurrently and collect per-category results.
///
/// Order within a category is the provider's order; duplicate ids within a
/// category are dropped (first occurrence wins).
pub async fn scan_all(source: &dyn InventorySource) -> ScanOutcome {
    let (ec2, ebs, eip, rds, elb) = tokio::join!(
        source.stopped_instances(),
        source.unattached_volumes(),
        source.unassociated_addresses(),
        source.stopped_databases(),
        source.unused_load_balancers(),
    );

    let mut outcome = ScanOutcome::default();
    outcome.resources.ec2_stopped =
        collect(ec2, IdleCategory::Ec2Stopped, |i| &i.id, &mut outcome.failures);
    outcome.resources.ebs_unattached =
        collect(ebs, IdleCategory::EbsUnattached, |v| &v.id, &mut outcome.failures);
    outcome.resources.eip_unassociated = collect(
        eip,
        IdleCategory::EipUnassociated,
        |a| &a.allocation_id,
        &mut outcome.failures,
    );
    outcome.resources.rds_stopped =
        collect(rds, IdleCategory::RdsStopped, |d| &d.id, &mut outcome.failures);
    outcome.resources.elb_unused =
        collect(elb, IdleCategory::ElbUnused, |l| &l.arn, &mut outcome.failures);

    info!(
        total = outcome.resources.total_count(),
        degraded = outcome.failures.len(),
        "Idle-resource scan finished"
    );

    outcome
}

fn collect<T>(
    result: Result<Vec<T>>,
    category: IdleCategory,
    id: impl Fn(&T) -> &str,
    failures: &mut Vec<ScanFailure>,
) -> Vec<T> {
    match result {
        Ok(items) => {
            let mut seen = HashSet::new();
            items
                .into_iter()
                .filter(|item| seen.insert(id(item).to_string()))
                .collect()
        }
        Err(e) => {
            warn!(category = %category, error = %e, "Scan failed, category degraded to empty");
            failures.push(ScanFailure {
                category,
                reason: e.to_string(),
            });
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct FakeInventory {
        fail: Option<IdleCategory>,
    }

    fn instance(id: &str) -> StoppedInstance {
        StoppedInstance {
            id: id.to_string(),
            instance_type: "t3.medium".to_string(),
            name: Some("worker".to_string()),
            environment: None,
            launch_time: None,
        }
    }

    fn volume(id: &str) -> UnattachedVolume {
        UnattachedVolume {
            id: id.to_string(),
            size_gb: 100,
            volume_type: "gp3".to_string(),
            name: None,
            created: None,
        }
    }

    #[async_trait]
    impl InventorySource for FakeInventory {
        async fn stopped_instances(&self) -> Result<Vec<StoppedInstance>> {
            if self.fail == Some(IdleCategory::Ec2Stopped) {
                return Err(Error::RemoteDataUnavailable("access denied".into()));
            }
            // Contains a duplicate id on purpose
            Ok(vec![instance("i-1"), instance("i-2"), instance("i-1")])
        }

        async fn unattached_volumes(&self) -> Result<Vec<UnattachedVolume>> {
            if self.fail == Some(IdleCategory::EbsUnattached) {
                return Err(Error::RemoteDataUnavailable("access denied".into()));
            }
            Ok(vec![volume("vol-1")])
        }

        async fn unassociated_addresses(&self) -> Result<Vec<UnassociatedAddress>> {
            Ok(vec![UnassociatedAddress {
                allocation_id: "eipalloc-1".to_string(),
                public_ip: Some("198.51.100.7".to_string()),
                domain: Some("vpc".to_string()),
            }])
        }

        async fn stopped_databases(&self) -> Result<Vec<StoppedDatabase>> {
            Ok(vec![StoppedDatabase {
                id: "db-1".to_string(),
                instance_class: "db.t3.medium".to_string(),
                engine: "postgres".to_string(),
                storage_gb: 100,
            }])
        }

        async fn unused_load_balancers(&self) -> Result<Vec<UnusedLoadBalancer>> {
            Ok(vec![UnusedLoadBalancer {
                arn: "arn:aws:elasticloadbalancing:eu-west-1:123:loadbalancer/app/idle/abc".to_string(),
                name: "idle".to_string(),
                lb_type: "application".to_string(),
                scheme: "internet-facing".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn test_scan_all_dedups_within_category() {
        let outcome = scan_all(&FakeInventory { fail: None }).await;
        assert!(outcome.failures.is_empty());
        let ids: Vec<&str> = outcome
            .resources
            .ec2_stopped
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["i-1", "i-2"]);
        assert_eq!(outcome.resources.total_count(), 5);
    }

    #[tokio::test]
    async fn test_one_failing_category_leaves_others_populated() {
        let outcome = scan_all(&FakeInventory {
            fail: Some(IdleCategory::Ec2Stopped),
        })
        .await;

        assert!(outcome.resources.ec2_stopped.is_empty());
        assert_eq!(outcome.resources.ebs_unattached.len(), 1);
        assert_eq!(outcome.resources.eip_unassociated.len(), 1);
        assert_eq!(outcome.resources.rds_stopped.len(), 1);
        assert_eq!(outcome.resources.elb_unused.len(), 1);

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].category, IdleCategory::Ec2Stopped);
        assert!(outcome.failures[0].reason.contains("access denied"));
    }

    #[test]
    fn test_category_counts() {
        let mut set = IdleResourceSet::default();
        assert!(set.is_empty());
        set.ec2_stopped.push(instance("i-1"));
        set.ebs_unattached.push(volume("vol-1"));
        assert_eq!(set.count(IdleCategory::Ec2Stopped), 1);
        assert_eq!(set.count(IdleCategory::RdsStopped), 0);
        assert_eq!(set.total_count(), 2);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_report_keys_are_stable() {
        assert_eq!(IdleCategory::Ec2Stopped.as_str(), "ec2_stopped");
        assert_eq!(IdleCategory::ElbUnused.as_str(), "elb_unused");
        assert_eq!(
            IdleCategory::EipUnassociated.recommendation_category(),
            "Network Optimization"
        );
    }
}
