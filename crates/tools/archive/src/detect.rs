//! Archive format detection.
//!
//! An explicit `type` attribute wins, then the archive's file extension, then
//! the leading bytes of the file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use repofetch_core::{ArchiveDescriptor, ArchiveFormat, Failure, PersistentCause};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: [u8; 4] = *b"PK\x05\x06";
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";
const SNIFF_LEN: usize = 512;

/// Decide which format a descriptor's archive is in.
///
/// # Errors
///
/// Persistent [`PersistentCause::UnsupportedFormat`] if nothing matches;
/// transient if the archive cannot be read.
pub fn detect_format(descriptor: &ArchiveDescriptor) -> Result<ArchiveFormat, Failure> {
    if let Some(format) = descriptor.format() {
        return Ok(format);
    }
    let archive = descriptor.archive_path();
    if let Some(format) = archive
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(ArchiveFormat::from_file_name)
    {
        return Ok(format);
    }
    sniff(archive)?.ok_or_else(|| {
        Failure::Persistent(PersistentCause::UnsupportedFormat {
            archive: archive.to_path_buf(),
        })
    })
}

/// Detect the format from file content alone.
///
/// # Errors
///
/// Transient failure if the file cannot be opened or read.
pub fn sniff(path: &Path) -> Result<Option<ArchiveFormat>, Failure> {
    let file = File::open(path).map_err(|e| Failure::io(e, path, "open archive"))?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| Failure::io(e, path, "read archive header"))?;
    Ok(format_of(&header))
}

fn format_of(header: &[u8]) -> Option<ArchiveFormat> {
    if header.starts_with(&GZIP_MAGIC) {
        Some(ArchiveFormat::TarGz)
    } else if header.starts_with(&ZIP_MAGIC) || header.starts_with(&ZIP_EMPTY_MAGIC) {
        Some(ArchiveFormat::Zip)
    } else if header
        .get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len())
        .is_some_and(|magic| magic == USTAR_MAGIC)
    {
        Some(ArchiveFormat::Tar)
    } else {
        None
    }
}
