//! Blob store client implementation using Apache OpenDAL.

use std::future::Future;

use bytes::Bytes;
use opendal::{Operator, services};
use tokio::time::timeout;
use uuid::Uuid;

use super::config::{BlobConfig, BlobProvider};
use super::error::BlobError;

/// Location of an object stored in the remote blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Public URL the object is served from.
    pub url: String,
    /// Provider-side object identifier (the storage key).
    pub object_id: String,
}

/// Narrow capability interface over a remote object store.
///
/// Alternative backends are substituted by implementing this trait; the
/// orchestration code never sees provider details.
pub trait BlobStore: Send + Sync {
    /// Store an object under `key` and return its remote location.
    fn put(
        &self,
        key: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<StoredObject, BlobError>> + Send;

    /// Check whether an object exists in the remote store.
    fn exists(&self, object_id: &str) -> impl Future<Output = Result<bool, BlobError>> + Send;

    /// Delete an object. Deleting an absent object is a success.
    fn delete(&self, object_id: &str) -> impl Future<Output = Result<(), BlobError>> + Send;
}

/// Blob store client backed by an OpenDAL operator.
pub struct OpendalBlobStore {
    operator: Operator,
    config: BlobConfig,
}

impl OpendalBlobStore {
    /// Create a new blob store client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be initialized.
    pub fn from_config(config: BlobConfig) -> Result<Self, BlobError> {
        let operator = Self::create_operator(&config.provider)?;
        Ok(Self { operator, config })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &BlobProvider) -> Result<Operator, BlobError> {
        let operator = match provider {
            BlobProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);

                Operator::new(builder)
                    .map_err(|e| BlobError::configuration(e.to_string()))?
                    .finish()
            }
            BlobProvider::AzureBlob {
                account,
                access_key,
                container,
            } => {
                let builder = services::Azblob::default()
                    .account_name(account)
                    .account_key(access_key)
                    .container(container);

                Operator::new(builder)
                    .map_err(|e| BlobError::configuration(e.to_string()))?
                    .finish()
            }
            BlobProvider::LocalFs { root } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| BlobError::configuration("invalid path"))?,
                );

                Operator::new(builder)
                    .map_err(|e| BlobError::configuration(e.to_string()))?
                    .finish()
            }
        };

        Ok(operator)
    }

    /// Public URL an object key is served from.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        if let Some(base) = &self.config.public_base_url {
            return format!("{}/{key}", base.trim_end_matches('/'));
        }

        match &self.config.provider {
            BlobProvider::S3 {
                endpoint, bucket, ..
            } => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
            BlobProvider::AzureBlob {
                account, container, ..
            } => format!("https://{account}.blob.core.windows.net/{container}/{key}"),
            BlobProvider::LocalFs { root } => {
                format!("file://{}/{key}", root.display())
            }
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }
}

impl BlobStore for OpendalBlobStore {
    async fn put(&self, key: &str, payload: Bytes) -> Result<StoredObject, BlobError> {
        timeout(
            self.config.upload_timeout,
            self.operator.write(key, payload.to_vec()),
        )
        .await??;

        Ok(StoredObject {
            url: self.public_url(key),
            object_id: key.to_string(),
        })
    }

    async fn exists(&self, object_id: &str) -> Result<bool, BlobError> {
        match timeout(self.config.op_timeout, self.operator.stat(object_id)).await? {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, object_id: &str) -> Result<(), BlobError> {
        match timeout(self.config.op_timeout, self.operator.delete(object_id)).await? {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Build the object key for an attachment.
///
/// Format: `{org_id}/{owner_type}/{owner_id}/{attachment_id}/{sanitized_filename}`
#[must_use]
pub fn build_object_key(
    organization_id: Uuid,
    owner_type: &str,
    owner_id: Uuid,
    attachment_id: Uuid,
    file_name: &str,
) -> String {
    format!(
        "{organization_id}/{}/{owner_id}/{attachment_id}/{}",
        sanitize_segment(owner_type),
        sanitize_segment(file_name)
    )
}

/// Sanitize a key segment.
///
/// Only allows ASCII alphanumeric characters, dots, hyphens, and underscores.
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
