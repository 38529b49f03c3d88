//! Worklane outbox worker.
//!
//! One-shot batch entry point for the attachment outbox processor, meant to
//! be invoked by an external scheduler (cron, systemd timer, CI job). It
//! drains one bounded batch of outbox events, optionally purges old
//! soft-deleted attachments, logs a summary, and exits.
//!
//! Usage:
//!   worker [--limit N] [--organization UUID] [--purge-before-days N]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use worklane_core::attachment::AttachmentStore;
use worklane_core::outbox::{OutboxProcessor, ProcessorConfig};
use worklane_core::storage::{BlobConfig, BlobProvider, OpendalBlobStore};
use worklane_db::{AttachmentRepository, connect};
use worklane_shared::{AppConfig, BlobProviderSection, BlobSection, OutboxSection};

/// Parsed command-line options.
#[derive(Debug, Default, PartialEq, Eq)]
struct WorkerArgs {
    /// Override for the batch limit.
    limit: Option<u64>,
    /// Restrict the run to one organization.
    organization: Option<Uuid>,
    /// Purge soft-deleted attachments older than this many days.
    purge_before_days: Option<i64>,
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<WorkerArgs, String> {
    let mut parsed = WorkerArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--limit" => {
                let value = args.next().ok_or("--limit requires a value")?;
                parsed.limit =
                    Some(value.parse().map_err(|_| format!("invalid --limit: {value}"))?);
            }
            "--organization" => {
                let value = args.next().ok_or("--organization requires a value")?;
                parsed.organization = Some(
                    Uuid::parse_str(&value)
                        .map_err(|_| format!("invalid --organization: {value}"))?,
                );
            }
            "--purge-before-days" => {
                let value = args.next().ok_or("--purge-before-days requires a value")?;
                parsed.purge_before_days = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid --purge-before-days: {value}"))?,
                );
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(parsed)
}

/// Map the blob config section into the core blob client config.
fn blob_config(section: &BlobSection) -> BlobConfig {
    let provider = match &section.provider {
        BlobProviderSection::S3 {
            endpoint,
            bucket,
            access_key_id,
            secret_access_key,
            region,
        } => BlobProvider::s3(endpoint, bucket, access_key_id, secret_access_key, region),
        BlobProviderSection::AzureBlob {
            account,
            access_key,
            container,
        } => BlobProvider::azure_blob(account, access_key, container),
        BlobProviderSection::LocalFs { root } => BlobProvider::local_fs(root),
    };

    let mut config = BlobConfig::new(provider)
        .with_upload_timeout(Duration::from_secs(section.upload_timeout_secs))
        .with_op_timeout(Duration::from_secs(section.op_timeout_secs));
    if let Some(url) = &section.public_base_url {
        config = config.with_public_base_url(url);
    }
    config
}

/// Map the outbox config section into the processor config.
fn processor_config(section: &OutboxSection) -> ProcessorConfig {
    ProcessorConfig {
        batch_limit: section.batch_limit,
        max_attempts: section.max_attempts,
        backoff_base_secs: section.backoff_base_secs,
        backoff_cap_secs: section.backoff_cap_secs,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worklane=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args(std::env::args().skip(1)).map_err(anyhow::Error::msg)?;

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;

    // Connect to database
    let db = connect(&config.database.url).await?;
    info!("Connected to database");

    let repo = Arc::new(AttachmentRepository::new(db));
    let blob = Arc::new(
        OpendalBlobStore::from_config(blob_config(&config.blob))
            .context("failed to initialize blob store")?,
    );

    let processor = OutboxProcessor::new(
        repo.clone(),
        blob,
        processor_config(&config.outbox),
    );

    let summary = processor
        .run_batch(args.limit, args.organization)
        .await
        .context("outbox batch failed")?;

    info!(
        fetched = summary.fetched,
        verified = summary.verified,
        promoted = summary.promoted,
        demoted = summary.demoted,
        remote_deleted = summary.remote_deleted,
        deferred = summary.deferred,
        skipped = summary.skipped,
        exhausted = summary.exhausted,
        orphaned = summary.orphaned,
        errors = summary.errors,
        "worker run complete"
    );

    if let Some(days) = args.purge_before_days {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let purged = repo
            .purge_deleted(args.organization, cutoff)
            .await
            .context("purge failed")?;
        info!(purged, days, "purged soft-deleted attachments");
    }

    Ok(())
}
