use std::path::Path;

use crate::errors::{self, Error, Result};
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::SdkConfig as AwsSdkConfig;
use tokio::fs;

/// Implements AWS S3 manager.
#[derive(Debug, Clone)]
pub struct Manager {
    pub region: String,
    pub cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        Self {
            region: crate::region_of(shared_config),
            cli: Client::new(shared_config),
        }
    }

    /// Uploads a file to the bucket.
    pub async fn put_object(&self, file_path: &Path, s3_bucket: &str, s3_key: &str) -> Result<()> {
        let contents = fs::read(file_path).await.map_err(|e| {
            Error::other(format!("failed to read {} ({e})", file_path.display()))
        })?;
        let size = contents.len();

        log::info!(
            "put object '{}' (size {} bytes) to 's3://{}/{}'",
            file_path.display(),
            size,
            s3_bucket,
            s3_key
        );
        let ret = self
            .cli
            .put_object()
            .bucket(s3_bucket)
            .key(s3_key)
            .body(ByteStream::from(contents))
            .send()
            .await;
        match ret {
            Ok(_) => {}
            Err(e) => {
                return Err(Error::API {
                    message: format!("failed put_object {:?}", e),
                    retryable: errors::is_sdk_err_retryable(&e),
                });
            }
        }

        log::info!("uploaded to 's3://{s3_bucket}/{s3_key}'");
        Ok(())
    }
}
