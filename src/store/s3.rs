//! S3 adapter
//!
//! Thin wrapper around aws-sdk-s3 implementing [`ObjectStore`]. The SDK is
//! async; the adapter owns a small private tokio runtime and exposes the
//! blocking interface the threaded engine expects. Region resolution goes
//! through the SDK's default provider chain (`AWS_REGION`, shared config,
//! then instance metadata) and failing to resolve one is fatal.

use crate::error::{StoreError, StoreResult};
use crate::store::{ObjectRecord, ObjectStore};
use aws_config::meta::region::RegionProviderChain;
use aws_config::Region;
use aws_sdk_s3::Client;
use std::io::Write;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Connection options for [`S3Store`]
#[derive(Debug, Clone, Default)]
pub struct S3StoreOptions {
    /// Explicit region; falls back to the default provider chain
    pub region: Option<String>,

    /// Custom endpoint URL (e.g. a minio deployment)
    pub endpoint: Option<String>,

    /// Downgrade a custom https endpoint to http
    pub disable_ssl: bool,
}

/// Production object store backed by aws-sdk-s3
pub struct S3Store {
    client: Client,
    runtime: Runtime,
}

impl S3Store {
    /// Resolve credentials and region, and build the client
    pub fn connect(opts: S3StoreOptions) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("s3-store")
            .enable_all()
            .build()
            .map_err(|e| StoreError::Init {
                reason: e.to_string(),
            })?;

        let shared_config = runtime.block_on(async {
            let region_provider =
                RegionProviderChain::first_try(opts.region.clone().map(Region::new))
                    .or_default_provider();
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(region_provider)
                .load()
                .await
        });

        let region = shared_config.region().ok_or(StoreError::NoRegion)?;
        info!(region = %region, "resolved object store region");

        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared_config).force_path_style(true);
        if let Some(endpoint) = effective_endpoint(&opts) {
            info!(endpoint = %endpoint, "using custom object store endpoint");
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
        })
    }
}

/// Apply the `disable_ssl` downgrade to the configured endpoint
fn effective_endpoint(opts: &S3StoreOptions) -> Option<String> {
    let endpoint = opts.endpoint.as_deref()?;
    if !opts.disable_ssl {
        return Some(endpoint.to_string());
    }
    match endpoint.strip_prefix("https://") {
        Some(rest) => Some(format!("http://{rest}")),
        None => Some(endpoint.to_string()),
    }
}

impl ObjectStore for S3Store {
    fn list_pages(
        &self,
        bucket: &str,
        prefix: &str,
        on_page: &mut dyn FnMut(Vec<ObjectRecord>),
    ) -> StoreResult<()> {
        self.runtime.block_on(async {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| StoreError::List {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    message: e.to_string(),
                })?;

                let records: Vec<ObjectRecord> = page
                    .contents()
                    .iter()
                    .filter_map(|obj| {
                        let key = obj.key()?;
                        let Some(identity) = obj.e_tag() else {
                            warn!(key, "listing entry without an ETag, skipping");
                            return None;
                        };
                        Some(ObjectRecord::new(key, identity))
                    })
                    .collect();

                debug!(count = records.len(), "received listing page");
                // the handler may block on a full task queue, which pauses
                // the pagination and gives us listing backpressure for free
                on_page(records);
            }

            Ok(())
        })
    }

    fn download(&self, writer: &mut dyn Write, bucket: &str, key: &str) -> StoreResult<u64> {
        self.runtime.block_on(async {
            let resp = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| StoreError::Download {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: e.to_string(),
                })?;

            let mut body = resp.body;
            let mut written = 0u64;
            while let Some(chunk) = body.try_next().await.map_err(|e| StoreError::Download {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })? {
                writer.write_all(&chunk).map_err(|source| StoreError::Write {
                    key: key.to_string(),
                    source,
                })?;
                written += chunk.len() as u64;
            }

            Ok(written)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_passthrough() {
        let opts = S3StoreOptions {
            endpoint: Some("https://minio.internal:9000".into()),
            ..Default::default()
        };
        assert_eq!(
            effective_endpoint(&opts).unwrap(),
            "https://minio.internal:9000"
        );
    }

    #[test]
    fn test_endpoint_ssl_downgrade() {
        let opts = S3StoreOptions {
            endpoint: Some("https://minio.internal:9000".into()),
            disable_ssl: true,
            ..Default::default()
        };
        assert_eq!(
            effective_endpoint(&opts).unwrap(),
            "http://minio.internal:9000"
        );
    }

    #[test]
    fn test_no_endpoint_means_none() {
        let opts = S3StoreOptions {
            disable_ssl: true,
            ..Default::default()
        };
        assert_eq!(effective_endpoint(&opts), None);
    }
}
