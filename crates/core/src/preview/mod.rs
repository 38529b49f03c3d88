//! Degraded backup/preview generation.
//!
//! A preview is a small, locally-held copy of a file that stays usable when
//! the remote store is unavailable or unverified:
//! - images are resized and re-encoded at reduced quality
//! - text and documents keep a gzip-compressed byte prefix
//! - everything else keeps a raw head-bytes snippet
//!
//! Generation is best-effort by construction: malformed input yields no
//! preview, never an error.

mod config;
mod generator;

pub use config::PreviewConfig;
pub use generator::{DecompressError, Preview, PreviewGenerator};
