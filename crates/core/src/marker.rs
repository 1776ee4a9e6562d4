//! Completion markers for materialized repositories.
//!
//! A marker holds the fingerprint of the rule that produced the directory. It
//! is cleared when an attempt starts and written only after the attempt fully
//! succeeded, so a directory left half-populated by a failed or cancelled
//! attempt is never reported as complete.

use crate::error::Failure;
use crate::paths::ExternalLayout;
use crate::rule::RepositoryRule;
use std::io::ErrorKind;
use std::path::Path;

/// Whether `rule` is already materialized under `layout`.
///
/// True when the marker matches the rule's fingerprint and the repository
/// directory exists and is non-empty. Any read error counts as "not complete".
pub async fn is_complete(layout: &ExternalLayout, rule: &RepositoryRule) -> bool {
    let marker = layout.marker_path(rule.name());
    match tokio::fs::read_to_string(&marker).await {
        Ok(content) if content.trim() == rule.fingerprint() => {}
        Ok(_) => {
            tracing::debug!(rule = rule.name(), "Marker is stale");
            return false;
        }
        Err(_) => return false,
    }
    is_populated(&layout.repository_dir(rule.name())).await
}

/// Whether `dir` exists and contains at least one entry.
pub async fn is_populated(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// Record that `rule` completed.
///
/// # Errors
///
/// Transient failure if the marker cannot be written.
pub async fn write(layout: &ExternalLayout, rule: &RepositoryRule) -> Result<(), Failure> {
    let marker = layout.marker_path(rule.name());
    tokio::fs::write(&marker, format!("{}\n", rule.fingerprint()))
        .await
        .map_err(|e| Failure::io(e, &marker, "write marker"))
}

/// Remove the marker for `name`. A missing marker is not an error.
///
/// # Errors
///
/// Transient failure if the marker exists but cannot be removed.
pub async fn clear(layout: &ExternalLayout, name: &str) -> Result<(), Failure> {
    let marker = layout.marker_path(name);
    match tokio::fs::remove_file(&marker).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Failure::io(e, &marker, "remove marker")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ATTR_URL;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ExternalLayout, RepositoryRule) {
        let temp = TempDir::new().unwrap();
        let layout = ExternalLayout::new(temp.path()).unwrap();
        std::fs::create_dir_all(layout.root()).unwrap();
        let rule = RepositoryRule::http_archive("png").with_attribute(ATTR_URL, "http://x/png.tar.gz");
        (temp, layout, rule)
    }

    #[tokio::test]
    async fn test_complete_requires_marker_and_content() {
        let (_temp, layout, rule) = setup();
        let dir = layout.repository_dir("png");
        std::fs::create_dir_all(&dir).unwrap();

        assert!(!is_complete(&layout, &rule).await, "no marker yet");

        write(&layout, &rule).await.unwrap();
        assert!(!is_complete(&layout, &rule).await, "directory is empty");

        std::fs::write(dir.join("png.h"), "").unwrap();
        assert!(is_complete(&layout, &rule).await);
    }

    #[tokio::test]
    async fn test_changed_rule_invalidates_marker() {
        let (_temp, layout, rule) = setup();
        let dir = layout.repository_dir("png");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("png.h"), "").unwrap();
        write(&layout, &rule).await.unwrap();

        let changed = rule.clone().with_attribute("strip_prefix", "png-1.0");
        assert!(!is_complete(&layout, &changed).await);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (_temp, layout, rule) = setup();
        write(&layout, &rule).await.unwrap();
        assert!(layout.marker_path("png").exists());

        clear(&layout, "png").await.unwrap();
        assert!(!layout.marker_path("png").exists());
        clear(&layout, "png").await.unwrap();
    }

    #[tokio::test]
    async fn test_is_populated_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(!is_populated(&temp.path().join("missing")).await);
        assert!(!is_populated(temp.path()).await);
    }
}
