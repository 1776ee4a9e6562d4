//! Zip archive decompression.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use repofetch_core::{
    ArchiveDescriptor, ArchiveFormat, Decompressor, ExtractionSummary, Failure, FetchPhase,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::staging::{
    corrupt, entry_path, extract_via_staging, link_escapes, read_failure, reject_symlinked_path,
    unpack_failure, unsafe_entry,
};

/// Unpacks `.zip` archives, restoring unix modes and symlinks when recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipDecompressor;

impl ZipDecompressor {
    /// Create a zip decompressor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decompressor for ZipDecompressor {
    fn decompress(
        &self,
        descriptor: &ArchiveDescriptor,
        interrupt: &CancellationToken,
    ) -> Result<ExtractionSummary, Failure> {
        let archive_path = descriptor.archive_path();
        let file = File::open(archive_path).map_err(|e| Failure::io(e, archive_path, "open archive"))?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| zip_failure(e, archive_path))?;

        debug!(
            archive = %archive_path.display(),
            entries = archive.len(),
            "Unpacking zip archive"
        );
        extract_via_staging(descriptor, ArchiveFormat::Zip, |root| {
            unpack(archive, archive_path, root, interrupt)
        })
    }

    fn detect_format(&self, _descriptor: &ArchiveDescriptor) -> Option<ArchiveFormat> {
        Some(ArchiveFormat::Zip)
    }
}

fn unpack<R: Read + std::io::Seek>(
    mut archive: ZipArchive<R>,
    archive_path: &Path,
    root: &Path,
    interrupt: &CancellationToken,
) -> Result<usize, Failure> {
    let mut count = 0;
    for index in 0..archive.len() {
        if interrupt.is_cancelled() {
            return Err(Failure::interrupted(FetchPhase::Extraction));
        }
        let mut file = archive
            .by_index(index)
            .map_err(|e| zip_failure(e, archive_path))?;
        let raw = Path::new(file.name()).to_path_buf();
        // enclosed_name rejects absolute and parent-relative names
        if file.enclosed_name().is_none() {
            return Err(unsafe_entry(&raw));
        }
        let Some(relative) = entry_path(&raw)? else {
            continue;
        };
        reject_symlinked_path(root, &relative, &raw)?;
        let target = root.join(&relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| Failure::io(e, &target, "create directory"))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Failure::io(e, parent, "create directory"))?;
            }
            if file.is_symlink() {
                let mut link = String::new();
                file.read_to_string(&mut link)
                    .map_err(|e| read_failure(e, archive_path))?;
                if link_escapes(root, &relative, Path::new(&link)) {
                    return Err(unsafe_entry(&raw));
                }
                write_symlink(&link, &target)?;
            } else {
                let mut out =
                    File::create(&target).map_err(|e| Failure::io(e, &target, "create file"))?;
                std::io::copy(&mut file, &mut out)
                    .map_err(|e| unpack_failure(e, archive_path, &target))?;
            }
        }

        #[cfg(unix)]
        if !file.is_symlink()
            && let Some(mode) = file.unix_mode()
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| Failure::io(e, &target, "set permissions"))?;
        }

        trace!(entry = %relative.display(), "Unpacked entry");
        count += 1;
    }
    Ok(count)
}

#[cfg(unix)]
fn write_symlink(link: &str, target: &Path) -> Result<(), Failure> {
    std::os::unix::fs::symlink(link, target).map_err(|e| Failure::io(e, target, "create symlink"))
}

#[cfg(not(unix))]
fn write_symlink(link: &str, target: &Path) -> Result<(), Failure> {
    std::fs::write(target, link).map_err(|e| Failure::io(e, target, "write file"))
}

fn zip_failure(error: ZipError, archive: &Path) -> Failure {
    match error {
        ZipError::Io(e) => read_failure(e, archive),
        other => corrupt(archive, other),
    }
}
