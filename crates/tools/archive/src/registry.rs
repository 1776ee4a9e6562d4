//! Format-keyed dispatch to the concrete decompressors.

use std::collections::HashMap;
use std::sync::Arc;

use repofetch_core::{ArchiveDescriptor, ArchiveFormat, Decompressor, ExtractionSummary, Failure};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::detect::detect_format;
use crate::tarball::TarDecompressor;
use crate::zipfile::ZipDecompressor;

/// A [`Decompressor`] that detects the archive format and hands the archive
/// to the decompressor registered for it.
#[derive(Clone)]
pub struct DecompressorRegistry {
    decompressors: HashMap<ArchiveFormat, Arc<dyn Decompressor>>,
}

impl DecompressorRegistry {
    /// Create a registry with nothing registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decompressors: HashMap::new(),
        }
    }

    /// Create a registry handling every [`ArchiveFormat`].
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(ArchiveFormat::TarGz, Arc::new(TarDecompressor::gzip()));
        registry.register(ArchiveFormat::Tar, Arc::new(TarDecompressor::plain()));
        registry.register(ArchiveFormat::Zip, Arc::new(ZipDecompressor::new()));
        registry
    }

    /// Register (or replace) the decompressor for `format`.
    pub fn register(&mut self, format: ArchiveFormat, decompressor: Arc<dyn Decompressor>) {
        self.decompressors.insert(format, decompressor);
    }

    /// Decompressor registered for `format`.
    #[must_use]
    pub fn get(&self, format: ArchiveFormat) -> Option<&Arc<dyn Decompressor>> {
        self.decompressors.get(&format)
    }
}

impl Default for DecompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecompressorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<_> = self.decompressors.keys().map(|f| f.as_str()).collect();
        formats.sort_unstable();
        f.debug_struct("DecompressorRegistry")
            .field("formats", &formats)
            .finish()
    }
}

impl Decompressor for DecompressorRegistry {
    fn decompress(
        &self,
        descriptor: &ArchiveDescriptor,
        interrupt: &CancellationToken,
    ) -> Result<ExtractionSummary, Failure> {
        let format = detect_format(descriptor)?;
        let decompressor = self.get(format).ok_or_else(|| {
            Failure::Persistent(repofetch_core::PersistentCause::UnsupportedFormat {
                archive: descriptor.archive_path().to_path_buf(),
            })
        })?;
        debug!(repository = descriptor.target_name(), %format, "Dispatching decompressor");
        decompressor.decompress(descriptor, interrupt)
    }

    fn detect_format(&self, descriptor: &ArchiveDescriptor) -> Option<ArchiveFormat> {
        detect_format(descriptor).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handles_every_format() {
        let registry = DecompressorRegistry::default();
        for format in ArchiveFormat::ALL {
            assert!(registry.get(format).is_some(), "{format} not registered");
        }
        assert_eq!(
            format!("{registry:?}"),
            r#"DecompressorRegistry { formats: ["tar", "tar.gz", "zip"] }"#
        );
    }

    #[test]
    fn test_empty_registry_rejects_archives() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        std::fs::write(&archive, b"PK\x03\x04").unwrap();
        let descriptor = ArchiveDescriptor::builder("http_archive", "a")
            .archive_path(&archive)
            .repository_path(temp.path())
            .build()
            .unwrap();

        let err = DecompressorRegistry::empty()
            .decompress(&descriptor, &CancellationToken::new())
            .unwrap_err();

        assert!(err.to_string().contains("unsupported archive format"));
    }
}
