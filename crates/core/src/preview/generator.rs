//! Preview generator implementation.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;

use super::config::PreviewConfig;
use crate::attachment::BackupKind;

/// A generated degraded copy of a file.
#[derive(Debug, Clone)]
pub struct Preview {
    /// Preview payload. Gzip-compressed when `kind` is `Compressed`.
    pub bytes: Vec<u8>,
    /// How the payload was derived.
    pub kind: BackupKind,
}

/// Errors decompressing a stored `Compressed` backup.
#[derive(Debug, Error)]
pub enum DecompressError {
    /// Stored payload is not valid gzip data.
    #[error("backup payload is corrupt: {0}")]
    Corrupt(String),

    /// Decompressed output exceeded the configured ceiling.
    #[error("decompressed backup exceeds {max} bytes")]
    TooLarge {
        /// Maximum allowed output size.
        max: usize,
    },
}

/// Pure function of (bytes, MIME type) to an optional degraded copy.
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    config: PreviewConfig,
}

impl PreviewGenerator {
    /// Create a new preview generator.
    #[must_use]
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    /// Generate a preview bounded by the strict backup ceiling.
    ///
    /// Returns `None` when the input is malformed or the result exceeds the
    /// ceiling. Never fails.
    #[must_use]
    pub fn generate(&self, data: &[u8], mime_type: &str) -> Option<Preview> {
        self.render(data, mime_type, false)
    }

    /// Generate a preview on the best-effort fallback path.
    ///
    /// Uses the looser ceiling and degrades an undecodable image to a raw
    /// snippet instead of giving up.
    #[must_use]
    pub fn generate_best_effort(&self, data: &[u8], mime_type: &str) -> Option<Preview> {
        self.render(data, mime_type, true)
    }

    fn render(&self, data: &[u8], mime_type: &str, best_effort: bool) -> Option<Preview> {
        if data.is_empty() {
            return None;
        }

        let ceiling = if best_effort {
            self.config.fallback_backup_bytes
        } else {
            self.config.max_backup_bytes
        };

        let preview = if mime_type.starts_with("image/") {
            match self.thumbnail(data) {
                Some(bytes) => Preview {
                    bytes,
                    kind: BackupKind::Thumbnail,
                },
                None if best_effort => Preview {
                    bytes: self.snippet(data),
                    kind: BackupKind::Snippet,
                },
                None => return None,
            }
        } else if is_document_mime(mime_type) {
            Preview {
                bytes: self.compressed_prefix(data)?,
                kind: BackupKind::Compressed,
            }
        } else {
            Preview {
                bytes: self.snippet(data),
                kind: BackupKind::Snippet,
            }
        };

        if preview.bytes.len() as u64 > ceiling {
            if best_effort && preview.kind != BackupKind::Snippet {
                return Some(Preview {
                    bytes: self.snippet(data),
                    kind: BackupKind::Snippet,
                });
            }
            return None;
        }

        Some(preview)
    }

    /// Decode, resize to the bounded dimension, and re-encode as JPEG.
    fn thumbnail(&self, data: &[u8]) -> Option<Vec<u8>> {
        let img = image::load_from_memory(data).ok()?;
        let thumb = img
            .thumbnail(self.config.max_dimension, self.config.max_dimension)
            .to_rgb8();

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.config.jpeg_quality)
            .write_image(
                thumb.as_raw(),
                thumb.width(),
                thumb.height(),
                ExtendedColorType::Rgb8,
            )
            .ok()?;
        Some(out)
    }

    /// Gzip a bounded byte prefix of a document.
    fn compressed_prefix(&self, data: &[u8]) -> Option<Vec<u8>> {
        let prefix = &data[..data.len().min(self.config.text_prefix_limit)];

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(prefix).ok()?;
        encoder.finish().ok()
    }

    /// Raw head-bytes snippet.
    fn snippet(&self, data: &[u8]) -> Vec<u8> {
        data[..data.len().min(self.config.snippet_limit)].to_vec()
    }

    /// Decompress a stored `Compressed` backup with bounded output.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid gzip or the output
    /// exceeds the configured ceiling.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, DecompressError> {
        let max = self
            .config
            .text_prefix_limit
            .max(usize::try_from(self.config.fallback_backup_bytes).unwrap_or(usize::MAX));

        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        let mut buffer = [0u8; 8192];
        let mut total_read = 0usize;

        loop {
            let bytes_read = decoder
                .read(&mut buffer)
                .map_err(|e| DecompressError::Corrupt(e.to_string()))?;

            if bytes_read == 0 {
                break;
            }

            total_read = total_read.saturating_add(bytes_read);
            if total_read > max {
                return Err(DecompressError::TooLarge { max });
            }

            decompressed.extend_from_slice(&buffer[..bytes_read]);
        }

        Ok(decompressed)
    }
}

/// Document MIME types that keep a compressed text prefix.
fn is_document_mime(mime_type: &str) -> bool {
    if mime_type.starts_with("text/") {
        return true;
    }
    matches!(
        mime_type,
        "application/pdf"
            | "application/json"
            | "application/xml"
            | "application/rtf"
            | "application/msword"
            | "application/vnd.ms-excel"
    ) || mime_type.starts_with("application/vnd.openxmlformats-officedocument")
}
