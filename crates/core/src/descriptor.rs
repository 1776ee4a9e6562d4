//! Resolved parameters for unpacking one downloaded archive.

use crate::error::Failure;
use crate::rule::{ATTR_STRIP_PREFIX, ATTR_TYPE, RepositoryRule, RuleAttributes};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Archive formats repofetch can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Gzip-compressed tarball.
    #[serde(rename = "tar.gz")]
    TarGz,
    /// Uncompressed tarball.
    Tar,
    /// Zip archive.
    Zip,
}

impl ArchiveFormat {
    /// Every supported format.
    pub const ALL: [Self; 3] = [Self::TarGz, Self::Tar, Self::Zip];

    /// Canonical name, as accepted by the `type` attribute.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Tar => "tar",
            Self::Zip => "zip",
        }
    }

    /// Guess the format from a file name's extension.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "tar" => Ok(Self::Tar),
            "zip" => Ok(Self::Zip),
            other => Err(format!("unknown archive type '{other}'")),
        }
    }
}

/// Immutable description of one unpack operation.
///
/// Rebuilt on every fetch attempt; the archive path may differ between
/// attempts. Both paths are absolute and a strip prefix, when present, is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    target_kind: String,
    target_name: String,
    archive_path: PathBuf,
    repository_path: PathBuf,
    staging_path: PathBuf,
    strip_prefix: Option<String>,
    format: Option<ArchiveFormat>,
}

impl ArchiveDescriptor {
    /// Start building a descriptor.
    #[must_use]
    pub fn builder(
        target_kind: impl Into<String>,
        target_name: impl Into<String>,
    ) -> ArchiveDescriptorBuilder {
        ArchiveDescriptorBuilder {
            target_kind: target_kind.into(),
            target_name: target_name.into(),
            archive_path: None,
            repository_path: None,
            staging_path: None,
            strip_prefix: None,
            format: None,
        }
    }

    /// Build the descriptor for `rule` after its archive was downloaded.
    ///
    /// `strip_prefix` and `type` are only read when explicitly specified.
    ///
    /// # Errors
    ///
    /// Persistent failure if either attribute has the wrong type or an
    /// invalid value.
    pub fn for_rule(
        rule: &RepositoryRule,
        attributes: &dyn RuleAttributes,
        archive_path: &Path,
        repository_path: &Path,
    ) -> Result<Self, Failure> {
        let mut builder = Self::builder(rule.kind(), rule.name())
            .archive_path(archive_path)
            .repository_path(repository_path);

        if attributes.is_explicitly_specified(ATTR_STRIP_PREFIX) {
            builder = builder.strip_prefix(attributes.get_string(ATTR_STRIP_PREFIX)?);
        }
        if let Some(kind) = attributes.get_opt_string(ATTR_TYPE)? {
            let format = kind.parse::<ArchiveFormat>().map_err(|_| {
                Failure::invalid_attribute(ATTR_TYPE, "one of tar.gz, tgz, tar, zip", format!("'{kind}'"))
            })?;
            builder = builder.format(format);
        }
        builder.build()
    }

    /// Rule kind, e.g. `http_archive`.
    #[must_use]
    pub fn target_kind(&self) -> &str {
        &self.target_kind
    }

    /// Rule name.
    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Downloaded archive.
    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Directory the archive is unpacked into.
    #[must_use]
    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    /// Scratch directory extraction happens in before entries are placed.
    #[must_use]
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Prefix stripped from every entry, without trailing slashes.
    #[must_use]
    pub fn strip_prefix(&self) -> Option<&str> {
        self.strip_prefix.as_deref()
    }

    /// Explicit format override from the `type` attribute.
    #[must_use]
    pub fn format(&self) -> Option<ArchiveFormat> {
        self.format
    }
}

/// Builder for [`ArchiveDescriptor`].
#[derive(Debug, Clone)]
pub struct ArchiveDescriptorBuilder {
    target_kind: String,
    target_name: String,
    archive_path: Option<PathBuf>,
    repository_path: Option<PathBuf>,
    staging_path: Option<PathBuf>,
    strip_prefix: Option<String>,
    format: Option<ArchiveFormat>,
}

impl ArchiveDescriptorBuilder {
    /// Set the downloaded archive path.
    #[must_use]
    pub fn archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(path.into());
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn repository_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.repository_path = Some(path.into());
        self
    }

    /// Set the staging directory. Defaults to a sibling of the output
    /// directory named `.<target name>.staging`.
    #[must_use]
    pub fn staging_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_path = Some(path.into());
        self
    }

    /// Set the prefix to strip.
    #[must_use]
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    /// Set an explicit archive format.
    #[must_use]
    pub fn format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Persistent failure if a path is missing or relative, or if the strip
    /// prefix is empty or escapes the archive root.
    pub fn build(self) -> Result<ArchiveDescriptor, Failure> {
        let archive_path = require_absolute(self.archive_path, "archive path")?;
        let repository_path = require_absolute(self.repository_path, "repository path")?;
        let staging_path = match self.staging_path {
            Some(path) => require_absolute(Some(path), "staging path")?,
            None => repository_path
                .with_file_name(format!(".{}.staging", self.target_name)),
        };

        let strip_prefix = self
            .strip_prefix
            .map(|raw| normalize_prefix(&raw))
            .transpose()?;

        Ok(ArchiveDescriptor {
            target_kind: self.target_kind,
            target_name: self.target_name,
            archive_path,
            repository_path,
            staging_path,
            strip_prefix,
            format: self.format,
        })
    }
}

fn require_absolute(path: Option<PathBuf>, what: &str) -> Result<PathBuf, Failure> {
    match path {
        Some(path) if path.is_absolute() => Ok(path),
        Some(path) => Err(Failure::invalid_attribute(
            what,
            "an absolute path",
            path.display().to_string(),
        )),
        None => Err(Failure::missing_attribute(what)),
    }
}

fn normalize_prefix(raw: &str) -> Result<String, Failure> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(Failure::invalid_attribute(
            ATTR_STRIP_PREFIX,
            "a non-empty path",
            format!("'{raw}'"),
        ));
    }
    if trimmed.split('/').any(|part| matches!(part, "" | "." | "..")) {
        return Err(Failure::invalid_attribute(
            ATTR_STRIP_PREFIX,
            "a relative path inside the archive",
            format!("'{raw}'"),
        ));
    }
    Ok(trimmed.to_string())
}
