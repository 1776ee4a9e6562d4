//! Extraction through a per-rule staging directory.
//!
//! Archives are unpacked into `<external root>/.<name>.staging` first. Once
//! every entry is written, the strip prefix is resolved inside the staging
//! tree and the resulting top-level entries are moved into the repository
//! directory, replacing stale entries of the same name. The staging
//! directory is removed afterwards, on success and on failure.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use repofetch_core::{ArchiveDescriptor, ArchiveFormat, ExtractionSummary, Failure, PersistentCause};
use tracing::{debug, trace};

/// A freshly created staging directory, removed on drop.
#[derive(Debug)]
pub struct Staging {
    root: PathBuf,
}

impl Staging {
    /// Create an empty staging directory at `path`, discarding leftovers from
    /// an earlier attempt.
    ///
    /// # Errors
    ///
    /// Transient failure if the directory cannot be cleared or created.
    pub fn prepare(path: &Path) -> Result<Self, Failure> {
        remove_path(path)?;
        std::fs::create_dir_all(path).map_err(|e| Failure::io(e, path, "create staging directory"))?;
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Root entries are unpacked under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Top-level names currently in the staging tree, sorted.
    ///
    /// # Errors
    ///
    /// Transient failure if the directory cannot be read.
    pub fn top_level(&self) -> Result<Vec<String>, Failure> {
        list_names(&self.root)
    }

    /// Apply the descriptor's strip prefix and move entries into the
    /// repository directory. Returns the names placed at its root.
    ///
    /// # Errors
    ///
    /// Persistent [`PersistentCause::MissingPrefix`] if the prefix does not
    /// name a directory in the archive; transient on I/O failure.
    pub fn place(self, descriptor: &ArchiveDescriptor) -> Result<Vec<String>, Failure> {
        let source = match descriptor.strip_prefix() {
            None => self.root.clone(),
            Some(prefix) => {
                let candidate = self.root.join(prefix);
                if !candidate.is_dir() {
                    return Err(Failure::Persistent(PersistentCause::MissingPrefix {
                        prefix: prefix.to_string(),
                        archive: descriptor.archive_path().to_path_buf(),
                        found: self.top_level()?,
                    }));
                }
                candidate
            }
        };

        let destination = descriptor.repository_path();
        std::fs::create_dir_all(destination)
            .map_err(|e| Failure::io(e, destination, "create directory"))?;

        let names = list_names(&source)?;
        for name in &names {
            let from = source.join(name);
            let to = destination.join(name);
            remove_path(&to)?;
            std::fs::rename(&from, &to).map_err(|e| Failure::io(e, &to, "move extracted entry"))?;
            trace!(entry = %name, "Placed entry");
        }
        debug!(
            repository = descriptor.target_name(),
            placed = names.len(),
            "Moved staged entries into repository"
        );
        Ok(names)
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root)
            && e.kind() != ErrorKind::NotFound
        {
            debug!(path = %self.root.display(), error = %e, "Failed to remove staging directory");
        }
    }
}

/// Run `unpack` against a fresh staging directory and place the result.
///
/// `unpack` writes entries below the given root and returns how many it
/// wrote.
///
/// # Errors
///
/// Propagates failures from `unpack` and from placing the entries.
pub fn extract_via_staging(
    descriptor: &ArchiveDescriptor,
    format: ArchiveFormat,
    unpack: impl FnOnce(&Path) -> Result<usize, Failure>,
) -> Result<ExtractionSummary, Failure> {
    let staging = Staging::prepare(descriptor.staging_path())?;
    let entries = unpack(staging.root())?;
    let top_level = staging.place(descriptor)?;
    Ok(ExtractionSummary {
        format,
        entries,
        top_level,
    })
}

/// Normalize an archive entry path.
///
/// Returns `None` for the archive root itself (`./`).
///
/// # Errors
///
/// Persistent [`PersistentCause::UnsafeEntry`] for absolute paths and for
/// paths containing `..`.
pub fn entry_path(raw: &Path) -> Result<Option<PathBuf>, Failure> {
    let mut normalized = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_entry(raw));
            }
        }
    }
    Ok((!normalized.as_os_str().is_empty()).then_some(normalized))
}

/// Whether a symlink at `entry` pointing to `target` resolves outside the
/// archive root.
///
/// The target is walked from the entry's directory. Passing through a link
/// already unpacked under `root` counts as escaping, since its destination
/// is not known lexically.
#[must_use]
pub fn link_escapes(root: &Path, entry: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return true;
    }
    let mut resolved: Vec<&std::ffi::OsStr> = entry.parent().map_or_else(Vec::new, |parent| {
        parent
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect()
    });
    for component in target.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                let path: PathBuf = resolved.iter().collect();
                if root.join(path).is_symlink() {
                    return true;
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved.pop().is_none() {
                    return true;
                }
            }
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Fail if `relative` passes through, or lands on, a symlink already
/// unpacked under `root`.
///
/// Writing through such a link would place the entry wherever the link
/// points, possibly outside the root.
///
/// # Errors
///
/// Persistent [`PersistentCause::UnsafeEntry`] naming `raw`, or a transient
/// I/O failure if a path component cannot be inspected.
pub fn reject_symlinked_path(root: &Path, relative: &Path, raw: &Path) -> Result<(), Failure> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => return Err(unsafe_entry(raw)),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Failure::io(e, &current, "inspect entry path")),
        }
    }
    Ok(())
}

/// Persistent failure for an entry that would escape the root.
#[must_use]
pub fn unsafe_entry(raw: &Path) -> Failure {
    Failure::Persistent(PersistentCause::UnsafeEntry {
        entry: raw.display().to_string(),
    })
}

/// Persistent failure for an archive that cannot be parsed.
#[must_use]
pub fn corrupt(archive: &Path, message: impl std::fmt::Display) -> Failure {
    Failure::Persistent(PersistentCause::CorruptArchive {
        archive: archive.to_path_buf(),
        message: message.to_string(),
    })
}

/// Classify an I/O error raised while reading or unpacking an archive.
///
/// Errors describing malformed data are persistent; anything else comes from
/// the local disk and is transient.
#[must_use]
pub fn unpack_failure(error: std::io::Error, archive: &Path, path: &Path) -> Failure {
    match error.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
            corrupt(archive, error)
        }
        _ => Failure::io(error, path, "unpack entry"),
    }
}

/// Classify an I/O error raised while parsing archive structure.
///
/// Parsers report malformed headers with [`ErrorKind::Other`], so that kind
/// is persistent here as well.
#[must_use]
pub fn read_failure(error: std::io::Error, archive: &Path) -> Failure {
    match error.kind() {
        ErrorKind::Other => corrupt(archive, error),
        _ => unpack_failure(error, archive, archive),
    }
}

fn list_names(dir: &Path) -> Result<Vec<String>, Failure> {
    let entries = std::fs::read_dir(dir).map_err(|e| Failure::io(e, dir, "read directory"))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Failure::io(e, dir, "read directory"))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn remove_path(path: &Path) -> Result<(), Failure> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Failure::io(e, path, "inspect")),
    };
    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| Failure::io(e, path, "remove"))
}
