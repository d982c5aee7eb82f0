//! Pluggable pricing table for monthly-impact estimates.
//!
//! The values here are advisory assumptions used to rank recommendations,
//! not a pricing lookup: every figure can be overridden from the `[pricing]`
//! config section, and nothing downstream treats them as billable amounts.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::scanner::{
    IdleCategory, IdleResourceSet, StoppedDatabase, StoppedInstance, UnattachedVolume,
};

#[derive(Debug, Clone, Deserialize)]
pub struct PricingTable {
    /// Assumed monthly cost per stopped instance, by instance type.
    #[serde(default = "default_ec2_monthly")]
    pub ec2_monthly: BTreeMap<String, f64>,
    #[serde(default = "default_ec2_fallback")]
    pub ec2_fallback_monthly: f64,
    /// Assumed monthly cost per GB of unattached volume, by volume type.
    #[serde(default = "default_ebs_gb_monthly")]
    pub ebs_gb_monthly: BTreeMap<String, f64>,
    #[serde(default = "default_ebs_fallback")]
    pub ebs_fallback_gb_monthly: f64,
    /// Flat monthly cost per idle Elastic IP.
    #[serde(default = "default_eip_monthly")]
    pub eip_monthly: f64,
    /// Assumed monthly instance cost per stopped database, by instance class.
    #[serde(default = "default_rds_monthly")]
    pub rds_monthly: BTreeMap<String, f64>,
    #[serde(default = "default_rds_fallback")]
    pub rds_fallback_monthly: f64,
    /// Monthly cost per GB of allocated database storage.
    #[serde(default = "default_rds_storage")]
    pub rds_storage_gb_monthly: f64,
    /// Flat monthly cost per unused load balancer.
    #[serde(default = "default_elb_monthly")]
    pub elb_monthly: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            ec2_monthly: default_ec2_monthly(),
            ec2_fallback_monthly: default_ec2_fallback(),
            ebs_gb_monthly: default_ebs_gb_monthly(),
            ebs_fallback_gb_monthly: default_ebs_fallback(),
            eip_monthly: default_eip_monthly(),
            rds_monthly: default_rds_monthly(),
            rds_fallback_monthly: default_rds_fallback(),
            rds_storage_gb_monthly: default_rds_storage(),
            elb_monthly: default_elb_monthly(),
        }
    }
}

fn default_ec2_monthly() -> BTreeMap<String, f64> {
    [
        ("t3.micro", 10.0),
        ("t3.small", 15.0),
        ("t3.medium", 30.0),
        ("t3.large", 60.0),
        ("t3.xlarge", 120.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_ec2_fallback() -> f64 {
    30.0
}

fn default_ebs_gb_monthly() -> BTreeMap<String, f64> {
    [("gp3", 0.08), ("gp2", 0.10), ("io1", 0.125), ("st1", 0.045)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_ebs_fallback() -> f64 {
    0.08
}

fn default_eip_monthly() -> f64 {
    3.65
}

fn default_rds_monthly() -> BTreeMap<String, f64> {
    [
        ("db.t3.micro", 15.0),
        ("db.t3.small", 30.0),
        ("db.t3.medium", 60.0),
        ("db.t3.large", 120.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_rds_fallback() -> f64 {
    60.0
}

fn default_rds_storage() -> f64 {
    0.115
}

fn default_elb_monthly() -> f64 {
    18.0
}

impl PricingTable {
    pub fn instance_impact(&self, instance: &StoppedInstance) -> f64 {
        *self
            .ec2_monthly
            .get(&instance.instance_type)
            .unwrap_or(&self.ec2_fallback_monthly)
    }

    pub fn volume_impact(&self, volume: &UnattachedVolume) -> f64 {
        let per_gb = self
            .ebs_gb_monthly
            .get(&volume.volume_type)
            .unwrap_or(&self.ebs_fallback_gb_monthly);
        volume.size_gb as f64 * per_gb
    }

    pub fn database_impact(&self, database: &StoppedDatabase) -> f64 {
        let instance_cost = self
            .rds_monthly
            .get(&database.instance_class)
            .unwrap_or(&self.rds_fallback_monthly);
        instance_cost + database.storage_gb as f64 * self.rds_storage_gb_monthly
    }

    /// Estimated monthly impact of everything in one category.
    pub fn category_impact(&self, resources: &IdleResourceSet, category: IdleCategory) -> f64 {
        match category {
            IdleCategory::Ec2Stopped => resources
                .ec2_stopped
                .iter()
                .map(|i| self.instance_impact(i))
                .sum(),
            IdleCategory::EbsUnattached => resources
                .ebs_unattached
                .iter()
                .map(|v| self.volume_impact(v))
                .sum(),
            IdleCategory::EipUnassociated => {
                resources.eip_unassociated.len() as f64 * self.eip_monthly
            }
            IdleCategory::RdsStopped => resources
                .rds_stopped
                .iter()
                .map(|d| self.database_impact(d))
                .sum(),
            IdleCategory::ElbUnused => resources.elb_unused.len() as f64 * self.elb_monthly,
        }
    }

    /// Sum over all five categories; the report summary's potential savings.
    pub fn total_impact(&self, resources: &IdleResourceSet) -> f64 {
        IdleCategory::ALL
            .iter()
            .map(|category| self.category_impact(resources, *category))
            .sum()
    }
}
