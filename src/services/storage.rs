use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::error::ExternalError;
use crate::models::asset::{AssetKey, ResolvedAsset};
use crate::pipeline::collaborators::AssetStore;

const SERVICE: &str = "asset store";

/// Staging store on Cloudflare R2 (S3-compatible).
pub struct R2AssetStore {
    bucket: Box<Bucket>,
}

impl R2AssetStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;
        check_status(response.status_code(), key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await?;
        check_status(response.status_code(), key)?;
        Ok(response.bytes().to_vec())
    }
}

fn check_status(code: u16, key: &str) -> Result<(), StorageError> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(StorageError::Status {
            code,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl AssetStore for R2AssetStore {
    async fn store(&self, asset: &ResolvedAsset, key: &AssetKey) -> Result<String, ExternalError> {
        let path = key.object_key();
        self.put(&path, &asset.bytes, &asset.content_type)
            .await
            .map_err(ExternalError::from)?;
        tracing::debug!(path = %path, size = asset.size(), "Asset staged");
        Ok(path)
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, ExternalError> {
        self.get(path).await.map_err(ExternalError::from)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 returned HTTP {code} for '{key}'")]
    Status { code: u16, key: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl From<StorageError> for ExternalError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::Status { code, .. }
                if *code == 408 || *code == 429 || *code >= 500 =>
            {
                ExternalError::transient(SERVICE, err.to_string())
            }
            StorageError::S3(_) => ExternalError::transient(SERVICE, err.to_string()),
            _ => ExternalError::non_retryable(SERVICE, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_status_errors_are_classified() {
        let busy: ExternalError = check_status(503, "k").unwrap_err().into();
        assert_eq!(busy.class(), ErrorClass::Transient);

        let denied: ExternalError = check_status(403, "k").unwrap_err().into();
        assert_eq!(denied.class(), ErrorClass::NonRetryable);

        assert!(check_status(200, "k").is_ok());
    }

    #[test]
    fn test_config_error_is_not_retried() {
        let err: ExternalError = StorageError::Config("bad endpoint".into()).into();
        assert_eq!(err.class(), ErrorClass::NonRetryable);
    }
}
