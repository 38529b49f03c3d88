//! Shared configuration for Worklane services.
//!
//! This crate provides the layered application configuration consumed by the
//! worker and migrator binaries. Domain crates receive plain config structs
//! mapped from these sections; they never read the environment themselves.

pub mod config;

pub use config::{
    AppConfig, AttachmentSection, BlobProviderSection, BlobSection, DatabaseConfig, OutboxSection,
};
