//! S3-backed report store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use chrono::NaiveDate;
use tracing::info;

use crate::error::{Error, Result};
use crate::report::Report;
use crate::store::{
    decode, encode, DateRange, ReportStore, StoredReportLocator, DATED_PREFIX, LATEST_KEY,
};

pub struct S3ReportStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    timeout: Duration,
}

impl S3ReportStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, bucket: String, timeout: Duration) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(sdk_config),
            bucket,
            timeout,
        }
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::StorageUnavailable(format!(
                "{what} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn put_key(&self, key: &str, bytes: Vec<u8>, report_date: NaiveDate) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type("application/json")
            .server_side_encryption(ServerSideEncryption::Aes256)
            .metadata("report-date", report_date.to_string())
            .send()
            .await
            .map_err(|e| {
                Error::StorageUnavailable(format!(
                    "put s3://{}/{key} failed: {}",
                    self.bucket,
                    e.into_service_error()
                ))
            })?;
        Ok(())
    }

    async fn get_key(&self, key: &str) -> Result<Report> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    Error::NotFound(format!("no report at s3://{}/{key}", self.bucket))
                } else {
                    Error::StorageUnavailable(format!(
                        "get s3://{}/{key} failed: {service_error}",
                        self.bucket
                    ))
                }
            })?;
        let bytes = output.body.collect().await.map_err(|e| {
            Error::StorageUnavailable(format!("read s3://{}/{key} failed: {e}", self.bucket))
        })?;
        decode(&bytes.into_bytes())
    }
}

#[async_trait]
impl ReportStore for S3ReportStore {
    async fn put(&self, report: &Report) -> Result<StoredReportLocator> {
        let locator = StoredReportLocator::for_date(report.date);
        let bytes = encode(report)?;

        // Dated copy first so the latest pointer never leads nowhere.
        self.bounded("report upload", async {
            self.put_key(&locator.key, bytes.clone(), report.date).await?;
            self.put_key(LATEST_KEY, bytes, report.date).await
        })
        .await?;
        info!(bucket = %self.bucket, key = %locator.key, "report uploaded");
        Ok(locator)
    }

    async fn get(&self, date: Option<NaiveDate>) -> Result<Report> {
        let key = match date {
            Some(date) => StoredReportLocator::for_date(date).key,
            None => LATEST_KEY.to_string(),
        };
        self.bounded("report download", self.get_key(&key)).await
    }

    async fn list(&self, range: DateRange) -> Result<Vec<StoredReportLocator>> {
        self.bounded("report listing", async {
            let mut found = Vec::new();
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(DATED_PREFIX)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| {
                    Error::StorageUnavailable(format!(
                        "list s3://{} failed: {}",
                        self.bucket,
                        e.into_service_error()
                    ))
                })?;
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    if let Some(locator) = StoredReportLocator::from_key(key) {
                        if range.contains(locator.date) {
                            found.push(locator);
                        }
                    }
                }
            }
            found.sort_by_key(|locator| locator.date);
            Ok(found)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
