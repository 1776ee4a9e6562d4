//! Tarball decompression, plain or gzip-compressed.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use repofetch_core::{
    ArchiveDescriptor, ArchiveFormat, Decompressor, ExtractionSummary, Failure, FetchPhase,
};
use tar::{Archive, EntryType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::staging::{
    entry_path, extract_via_staging, link_escapes, read_failure, reject_symlinked_path,
    unpack_failure, unsafe_entry,
};

/// Unpacks `.tar` and `.tar.gz` archives.
#[derive(Debug, Clone, Copy)]
pub struct TarDecompressor {
    gzip: bool,
}

impl TarDecompressor {
    /// Decompressor for gzip-compressed tarballs.
    #[must_use]
    pub fn gzip() -> Self {
        Self { gzip: true }
    }

    /// Decompressor for uncompressed tarballs.
    #[must_use]
    pub fn plain() -> Self {
        Self { gzip: false }
    }

    fn format(self) -> ArchiveFormat {
        if self.gzip {
            ArchiveFormat::TarGz
        } else {
            ArchiveFormat::Tar
        }
    }
}

impl Decompressor for TarDecompressor {
    fn decompress(
        &self,
        descriptor: &ArchiveDescriptor,
        interrupt: &CancellationToken,
    ) -> Result<ExtractionSummary, Failure> {
        let archive_path = descriptor.archive_path();
        let file = File::open(archive_path).map_err(|e| Failure::io(e, archive_path, "open archive"))?;
        let reader = BufReader::new(file);

        debug!(
            archive = %archive_path.display(),
            format = %self.format(),
            "Unpacking tarball"
        );
        extract_via_staging(descriptor, self.format(), |root| {
            if self.gzip {
                unpack(Archive::new(GzDecoder::new(reader)), archive_path, root, interrupt)
            } else {
                unpack(Archive::new(reader), archive_path, root, interrupt)
            }
        })
    }

    fn detect_format(&self, _descriptor: &ArchiveDescriptor) -> Option<ArchiveFormat> {
        Some(self.format())
    }
}

fn unpack<R: Read>(
    mut archive: Archive<R>,
    archive_path: &Path,
    root: &Path,
    interrupt: &CancellationToken,
) -> Result<usize, Failure> {
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut count = 0;
    let entries = archive.entries().map_err(|e| read_failure(e, archive_path))?;
    for entry in entries {
        if interrupt.is_cancelled() {
            return Err(Failure::interrupted(FetchPhase::Extraction));
        }
        let mut entry = entry.map_err(|e| read_failure(e, archive_path))?;
        let raw = entry.path().map_err(|e| read_failure(e, archive_path))?.into_owned();
        let Some(relative) = entry_path(&raw)? else {
            continue;
        };
        reject_symlinked_path(root, &relative, &raw)?;

        match entry.header().entry_type() {
            EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| read_failure(e, archive_path))?
                    .ok_or_else(|| unsafe_entry(&raw))?;
                if link_escapes(root, &relative, &target) {
                    return Err(unsafe_entry(&raw));
                }
            }
            EntryType::Link => {
                let target = entry
                    .link_name()
                    .map_err(|e| read_failure(e, archive_path))?
                    .ok_or_else(|| unsafe_entry(&raw))?;
                entry_path(&target)?;
            }
            _ => {}
        }

        let target = root.join(&relative);
        let written = entry
            .unpack_in(root)
            .map_err(|e| unpack_failure(e, archive_path, &target))?;
        if !written {
            return Err(unsafe_entry(&raw));
        }
        trace!(entry = %relative.display(), "Unpacked entry");
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn write_tar(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_counts_entries() {
        let temp = TempDir::new().unwrap();
        let repository = temp.path().join("png");
        std::fs::create_dir_all(&repository).unwrap();
        let archive = repository.join("png.tar.gz");
        write_tar(&archive, &[("png-1.0/png.h", b"h"), ("png-1.0/png.c", b"c")]);
        let descriptor = ArchiveDescriptor::builder("http_archive", "png")
            .archive_path(&archive)
            .repository_path(&repository)
            .build()
            .unwrap();

        let summary = TarDecompressor::gzip()
            .decompress(&descriptor, &CancellationToken::new())
            .unwrap();

        assert_eq!(summary.entries, 2);
        assert_eq!(summary.format, ArchiveFormat::TarGz);
        assert_eq!(summary.top_level, ["png-1.0"]);
        assert!(repository.join("png-1.0/png.c").exists());
    }
}
