//! AWS implementation of [`InventorySource`].
//!
//! Each category maps to one inventory API family: EC2 instances, EBS
//! volumes, and Elastic IPs through the EC2 API, databases through RDS, and
//! load balancers through ELBv2 with a walk over target-group health.

use async_trait::async_trait;
use aws_sdk_ec2::types::Filter;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::{
    InventorySource, StoppedDatabase, StoppedInstance, UnassociatedAddress, UnattachedVolume,
    UnusedLoadBalancer,
};
use crate::error::{Error, Result};

pub struct AwsInventory {
    ec2: aws_sdk_ec2::Client,
    rds: aws_sdk_rds::Client,
    elbv2: aws_sdk_elasticloadbalancingv2::Client,
    timeout: Duration,
}

impl AwsInventory {
    pub fn new(sdk_config: &aws_config::SdkConfig, timeout: Duration) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(sdk_config),
            rds: aws_sdk_rds::Client::new(sdk_config),
            elbv2: aws_sdk_elasticloadbalancingv2::Client::new(sdk_config),
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
impl InventorySource for AwsInventory {
    async fn stopped_instances(&self) -> Result<Vec<StoppedInstance>> {
        self.bounded("stopped-instance scan", async {
            let mut found = Vec::new();
            let mut pages = self
                .ec2
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name("instance-state-name")
                        .values("stopped")
                        .build(),
                )
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;
                for reservation in page.reservations() {
                    for instance in reservation.instances() {
                        let Some(id) = instance.instance_id() else {
                            continue;
                        };
                        found.push(StoppedInstance {
                            id: id.to_string(),
                            instance_type: instance
                                .instance_type()
                                .map(|t| t.as_str().to_string())
                                .unwrap_or_else(|| "unknown".to_string()),
                            name: tag_value(instance.tags(), "Name"),
                            environment: tag_value(instance.tags(), "Environment"),
                            launch_time: instance.launch_time().and_then(iso8601),
                        });
                    }
                }
            }

            debug!(count = found.len(), "Found stopped EC2 instances");
            Ok(found)
        })
        .await
    }

    async fn unattached_volumes(&self) -> Result<Vec<UnattachedVolume>> {
        self.bounded("unattached-volume scan", async {
            let mut found = Vec::new();
            let mut pages = self
                .ec2
                .describe_volumes()
                .filters(Filter::builder().name("status").values("available").build())
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;
                for volume in page.volumes() {
                    let Some(id) = volume.volume_id() else {
                        continue;
                    };
                    found.push(UnattachedVolume {
                        id: id.to_string(),
                        size_gb: volume.size().unwrap_or_default(),
                        volume_type: volume
                            .volume_type()
                            .map(|t| t.as_str().to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                        name: tag_value(volume.tags(), "Name"),
                        created: volume.create_time().and_then(iso8601),
                    });
                }
            }

            debug!(count = found.len(), "Found unattached EBS volumes");
            Ok(found)
        })
        .await
    }

    async fn unassociated_addresses(&self) -> Result<Vec<UnassociatedAddress>> {
        self.bounded("unassociated-address scan", async {
            let output = self
                .ec2
                .describe_addresses()
                .send()
                .await
                .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;

            let found: Vec<UnassociatedAddress> = output
                .addresses()
                .iter()
                .filter(|address| address.association_id().is_none())
                .filter_map(|address| {
                    address.allocation_id().map(|id| UnassociatedAddress {
                        allocation_id: id.to_string(),
                        public_ip: address.public_ip().map(str::to_string),
                        domain: address.domain().map(|d| d.as_str().to_string()),
                    })
                })
                .collect();

            debug!(count = found.len(), "Found unassociated Elastic IPs");
            Ok(found)
        })
        .await
    }

    async fn stopped_databases(&self) -> Result<Vec<StoppedDatabase>> {
        self.bounded("stopped-database scan", async {
            let mut found = Vec::new();
            let mut pages = self.rds.describe_db_instances().into_paginator().send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;
                for db in page.db_instances() {
                    if db.db_instance_status() != Some("stopped") {
                        continue;
                    }
                    let Some(id) = db.db_instance_identifier() else {
                        continue;
                    };
                    found.push(StoppedDatabase {
                        id: id.to_string(),
                        instance_class: db
                            .db_instance_class()
                            .unwrap_or("unknown")
                            .to_string(),
                        engine: db.engine().unwrap_or("unknown").to_string(),
                        storage_gb: db.allocated_storage().unwrap_or_default(),
                    });
                }
            }

            debug!(count = found.len(), "Found stopped RDS instances");
            Ok(found)
        })
        .await
    }

    async fn unused_load_balancers(&self) -> Result<Vec<UnusedLoadBalancer>> {
        self.bounded("unused-load-balancer scan", async {
            let mut found = Vec::new();
            let mut pages = self
                .elbv2
                .describe_load_balancers()
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;
                for lb in page.load_balancers() {
                    let Some(arn) = lb.load_balancer_arn() else {
                        continue;
                    };
                    if self.has_healthy_target(arn).await? {
                        continue;
                    }
                    found.push(UnusedLoadBalancer {
                        arn: arn.to_string(),
                        name: lb.load_balancer_name().unwrap_or("unknown").to_string(),
                        lb_type: lb
                            .r#type()
                            .map(|t| t.as_str().to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                        scheme: lb
                            .scheme()
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                    });
                }
            }

            debug!(count = found.len(), "Found unused load balancers");
            Ok(found)
        })
        .await
    }
}

impl AwsInventory {
    /// A load balancer counts as used as soon as any target in any of its
    /// target groups reports healthy.
    async fn has_healthy_target(&self, lb_arn: &str) -> Result<bool> {
        use aws_sdk_elasticloadbalancingv2::types::TargetHealthStateEnum;

        let groups = self
            .elbv2
            .describe_target_groups()
            .load_balancer_arn(lb_arn)
            .send()
            .await
            .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;

        for group in groups.target_groups() {
            let Some(group_arn) = group.target_group_arn() else {
                continue;
            };
            let health = self
                .elbv2
                .describe_target_health()
                .target_group_arn(group_arn)
                .send()
                .await
                .map_err(|e| Error::RemoteDataUnavailable(e.to_string()))?;

            let healthy = health.target_health_descriptions().iter().any(|desc| {
                desc.target_health()
                    .and_then(|h| h.state())
                    .map(|s| *s == TargetHealthStateEnum::Healthy)
                    .unwrap_or(false)
            });
            if healthy {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

fn tag_value(tags: &[aws_sdk_ec2::types::Tag], key: &str) -> Option<String> {
    tags.iter()
        .find(|tag| tag.key() == Some(key))
        .and_then(|tag| tag.value())
        .map(str::to_string)
}

fn iso8601(when: &aws_sdk_ec2::primitives::DateTime) -> Option<String> {
    chrono::DateTime::from_timestamp(when.secs(), when.subsec_nanos())
        .map(|t| t.to_rfc3339())
}
