//! Preview generator configuration.

/// Preview generator configuration.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Size ceiling for backups produced alongside a successful upload.
    pub max_backup_bytes: u64,
    /// Looser ceiling used on the best-effort fallback path.
    pub fallback_backup_bytes: u64,
    /// Maximum thumbnail dimension in pixels.
    pub max_dimension: u32,
    /// JPEG re-encode quality for thumbnails.
    pub jpeg_quality: u8,
    /// Byte prefix taken from documents before compression.
    pub text_prefix_limit: usize,
    /// Byte prefix stored verbatim for unknown content.
    pub snippet_limit: usize,
}

impl PreviewConfig {
    /// Default backup ceiling: 200 KiB.
    pub const DEFAULT_MAX_BACKUP_BYTES: u64 = 200 * 1024;
    /// Default fallback ceiling: 1 MiB.
    pub const DEFAULT_FALLBACK_BACKUP_BYTES: u64 = 1024 * 1024;
    /// Default thumbnail dimension: 256 px.
    pub const DEFAULT_MAX_DIMENSION: u32 = 256;
    /// Default JPEG quality.
    pub const DEFAULT_JPEG_QUALITY: u8 = 70;
    /// Default document prefix: 64 KiB.
    pub const DEFAULT_TEXT_PREFIX_LIMIT: usize = 64 * 1024;
    /// Default snippet size: 4 KiB.
    pub const DEFAULT_SNIPPET_LIMIT: usize = 4 * 1024;

    /// Set the strict backup ceiling.
    #[must_use]
    pub fn with_max_backup_bytes(mut self, bytes: u64) -> Self {
        self.max_backup_bytes = bytes;
        self
    }

    /// Set the fallback backup ceiling.
    #[must_use]
    pub fn with_fallback_backup_bytes(mut self, bytes: u64) -> Self {
        self.fallback_backup_bytes = bytes;
        self
    }

    /// Set the maximum thumbnail dimension.
    #[must_use]
    pub fn with_max_dimension(mut self, pixels: u32) -> Self {
        self.max_dimension = pixels;
        self
    }

    /// Set the document prefix limit.
    #[must_use]
    pub fn with_text_prefix_limit(mut self, bytes: usize) -> Self {
        self.text_prefix_limit = bytes;
        self
    }

    /// Set the snippet limit.
    #[must_use]
    pub fn with_snippet_limit(mut self, bytes: usize) -> Self {
        self.snippet_limit = bytes;
        self
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_backup_bytes: Self::DEFAULT_MAX_BACKUP_BYTES,
            fallback_backup_bytes: Self::DEFAULT_FALLBACK_BACKUP_BYTES,
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
            jpeg_quality: Self::DEFAULT_JPEG_QUALITY,
            text_prefix_limit: Self::DEFAULT_TEXT_PREFIX_LIMIT,
            snippet_limit: Self::DEFAULT_SNIPPET_LIMIT,
        }
    }
}
