//! On-disk layout of materialized repositories.
//!
//! Every path is derived from the output base and the rule name alone, so two
//! invocations that reference the same rule always resolve to the same
//! location and two rules with distinct names never share one:
//!
//! | Path | Purpose |
//! |------|---------|
//! | `<output_base>/external/<name>` | Repository directory |
//! | `<output_base>/external/@<name>.marker` | Completion marker |
//! | `<output_base>/external/.<name>.staging` | Extraction staging directory |
//!
//! The output base defaults to `<cache dir>/repofetch` and can be overridden
//! with `REPOFETCH_OUTPUT_BASE`.

use crate::error::WorkspaceError;
use std::path::{Path, PathBuf};

/// Environment variable overriding the default output base.
pub const OUTPUT_BASE_ENV: &str = "REPOFETCH_OUTPUT_BASE";

/// Name of the external-dependencies root under the output base.
pub const EXTERNAL_DIR: &str = "external";

/// Get the default output base.
///
/// Resolution order:
/// 1. `REPOFETCH_OUTPUT_BASE` environment variable
/// 2. Platform cache directory + `/repofetch`
///
/// # Errors
///
/// Returns an error if the cache directory cannot be determined.
pub fn default_output_base() -> Result<PathBuf, WorkspaceError> {
    if let Ok(dir) = std::env::var(OUTPUT_BASE_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    let base = dirs::cache_dir().ok_or_else(|| WorkspaceError::OutputBase {
        message: "could not determine the platform cache directory".to_string(),
    })?;

    Ok(base.join("repofetch"))
}

/// Resolves per-rule paths under `<output_base>/external`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLayout {
    root: PathBuf,
}

impl ExternalLayout {
    /// Create a layout rooted at `output_base/external`.
    ///
    /// A relative output base is resolved against the current directory so
    /// every derived path is absolute.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new(output_base: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let base = std::path::absolute(output_base.as_ref()).map_err(|e| {
            WorkspaceError::OutputBase {
                message: format!("{}: {e}", output_base.as_ref().display()),
            }
        })?;
        Ok(Self {
            root: base.join(EXTERNAL_DIR),
        })
    }

    /// Create a layout from [`default_output_base`].
    ///
    /// # Errors
    ///
    /// Returns an error if no output base can be determined.
    pub fn from_env() -> Result<Self, WorkspaceError> {
        Self::new(default_output_base()?)
    }

    /// The external-dependencies root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materialized directory for `name`.
    #[must_use]
    pub fn repository_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Completion marker for `name`.
    #[must_use]
    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("@{name}.marker"))
    }

    /// Extraction staging directory for `name`.
    #[must_use]
    pub fn staging_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!(".{name}.staging"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_base() {
        temp_env::with_var_unset(OUTPUT_BASE_ENV, || {
            let dir = default_output_base().expect("output base should resolve");
            assert!(dir.ends_with("repofetch"), "Should end with repofetch: {dir:?}");
        });
    }

    #[test]
    fn test_output_base_override() {
        let test_dir = "/tmp/repofetch-test-base";
        temp_env::with_var(OUTPUT_BASE_ENV, Some(test_dir), || {
            let dir = default_output_base().expect("output base should resolve");
            assert_eq!(dir, PathBuf::from(test_dir));
        });
    }

    #[test]
    fn test_empty_override_is_ignored() {
        temp_env::with_var(OUTPUT_BASE_ENV, Some(""), || {
            let dir = default_output_base().expect("output base should resolve");
            assert!(dir.ends_with("repofetch"));
        });
    }

    #[test]
    fn test_layout_paths() {
        let layout = ExternalLayout::new("/out").unwrap();
        assert_eq!(layout.root(), Path::new("/out/external"));
        assert_eq!(layout.repository_dir("png"), Path::new("/out/external/png"));
        assert_eq!(
            layout.marker_path("png"),
            Path::new("/out/external/@png.marker")
        );
        assert_eq!(
            layout.staging_dir("png"),
            Path::new("/out/external/.png.staging")
        );
    }

    #[test]
    fn test_relative_base_becomes_absolute() {
        let layout = ExternalLayout::new("relative/base").unwrap();
        assert!(layout.root().is_absolute());
        assert!(layout.repository_dir("zlib").ends_with("relative/base/external/zlib"));
    }

    #[test]
    fn test_distinct_names_never_collide() {
        let layout = ExternalLayout::new("/out").unwrap();
        let a = layout.repository_dir("a");
        let b = layout.repository_dir("b");
        assert_ne!(a, b);
        assert_ne!(layout.marker_path("a"), layout.marker_path("b"));
        assert_ne!(layout.staging_dir("a"), layout.staging_dir("b"));
        // Markers and staging dirs never shadow a repository directory
        assert!(!a.starts_with(layout.staging_dir("a")));
        assert_ne!(layout.marker_path("a"), a);
    }
}
