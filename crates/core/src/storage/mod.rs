//! Blob store client for remote attachment payloads, using Apache OpenDAL.
//!
//! The remote store is reached exclusively through the narrow [`BlobStore`]
//! capability trait (`put` / `exists` / `delete`), so alternative backends can
//! be substituted without touching the orchestration code. The shipped
//! implementation supports:
//! - S3-compatible: Cloudflare R2, Supabase Storage, AWS S3, DigitalOcean Spaces
//! - Azure Blob Storage
//! - Local filesystem (development only)

mod client;
mod config;
mod error;

pub use client::{BlobStore, OpendalBlobStore, StoredObject, build_object_key};
pub use config::{BlobConfig, BlobProvider};
pub use error::BlobError;
