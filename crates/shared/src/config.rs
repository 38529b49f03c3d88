//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    pub blob: BlobSection,
    /// Attachment and preview limits.
    #[serde(default)]
    pub attachments: AttachmentSection,
    /// Outbox processor configuration.
    #[serde(default)]
    pub outbox: OutboxSection,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Blob storage provider selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlobProviderSection {
    /// S3-compatible storage: Cloudflare R2, Supabase, AWS S3.
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// AWS access key ID.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// AWS region.
        region: String,
    },
    /// Azure Blob Storage.
    AzureBlob {
        /// Azure storage account name.
        account: String,
        /// Azure storage access key.
        access_key: String,
        /// Azure container name.
        container: String,
    },
    /// Local filesystem (development only).
    LocalFs {
        /// Root directory path.
        root: String,
    },
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlobSection {
    /// Provider selection and credentials.
    pub provider: BlobProviderSection,
    /// Base URL files are served from (CDN). Derived from the provider
    /// when absent.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Upload timeout in seconds.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    /// Timeout for exists/delete calls in seconds.
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,
}

fn default_upload_timeout() -> u64 {
    120
}

fn default_op_timeout() -> u64 {
    15
}

/// Attachment and preview limits.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentSection {
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Size ceiling for backups produced alongside a successful upload.
    #[serde(default = "default_max_backup_bytes")]
    pub max_backup_bytes: u64,
    /// Looser size ceiling for the best-effort fallback backup.
    #[serde(default = "default_fallback_backup_bytes")]
    pub fallback_backup_bytes: u64,
    /// Maximum thumbnail dimension in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// JPEG re-encode quality for thumbnails.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Byte prefix taken from documents before compression.
    #[serde(default = "default_text_prefix_limit")]
    pub text_prefix_limit: usize,
    /// Byte prefix stored verbatim for unknown content.
    #[serde(default = "default_snippet_limit")]
    pub snippet_limit: usize,
}

impl Default for AttachmentSection {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_backup_bytes: default_max_backup_bytes(),
            fallback_backup_bytes: default_fallback_backup_bytes(),
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
            text_prefix_limit: default_text_prefix_limit(),
            snippet_limit: default_snippet_limit(),
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_max_backup_bytes() -> u64 {
    200 * 1024
}

fn default_fallback_backup_bytes() -> u64 {
    1024 * 1024
}

fn default_max_dimension() -> u32 {
    256
}

fn default_jpeg_quality() -> u8 {
    70
}

fn default_text_prefix_limit() -> usize {
    64 * 1024
}

fn default_snippet_limit() -> usize {
    4 * 1024
}

/// Outbox processor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxSection {
    /// Maximum events handled per batch run.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u64,
    /// Attempt ceiling before giving up on an event.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for the capped exponential backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Upper bound on the backoff delay, in seconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

impl Default for OutboxSection {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
        }
    }
}

fn default_batch_limit() -> u64 {
    50
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    30
}

fn default_backoff_cap() -> u64 {
    3600
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("WORKLANE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
