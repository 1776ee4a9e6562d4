//! Sequences one repository fetch and classifies its failures.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use repofetch_events::{EventCategory, FetchEvent};

use super::{Decompressor, Downloader, ExtractionSummary};
use crate::descriptor::ArchiveDescriptor;
use crate::environment::FetchEnvironment;
use crate::error::{Failure, FetchPhase, Result};
use crate::marker;
use crate::node::RepositoryDirectoryValue;
use crate::paths::ExternalLayout;
use crate::rule::RepositoryRule;

const EVENT_TARGET: &str = "repofetch::fetch";

/// Turns a rule into a populated repository directory.
///
/// Holds no per-attempt state: everything an attempt needs is passed to
/// [`RepositoryFetcher::fetch`], and anything that must survive an attempt
/// lives on disk.
pub struct RepositoryFetcher {
    downloader: Arc<dyn Downloader>,
    decompressor: Arc<dyn Decompressor>,
    layout: ExternalLayout,
}

impl std::fmt::Debug for RepositoryFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryFetcher")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl RepositoryFetcher {
    /// Create a fetcher over the given collaborators.
    #[must_use]
    pub fn new(
        downloader: Arc<dyn Downloader>,
        decompressor: Arc<dyn Decompressor>,
        layout: ExternalLayout,
    ) -> Self {
        Self {
            downloader,
            decompressor,
            layout,
        }
    }

    /// Directory layout this fetcher writes into.
    #[must_use]
    pub fn layout(&self) -> &ExternalLayout {
        &self.layout
    }

    /// Environment variables the downloader needs snapshotted.
    #[must_use]
    pub fn environment_variables(&self) -> &[&str] {
        self.downloader.environment_variables()
    }

    /// Fetch `rule` into `output_directory`.
    ///
    /// Steps run strictly in order: clear marker, create directory, download,
    /// build descriptor, decompress, finalize. Download and decompression stop
    /// promptly when the environment is cancelled; a cancelled attempt never
    /// yields a value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Transient`] for environmental problems such as
    /// I/O, network or cancellation, and [`crate::Error::Persistent`] when the
    /// rule itself is wrong.
    /// Collaborator classifications are passed through unchanged.
    pub async fn fetch(
        &self,
        rule: &RepositoryRule,
        output_directory: &Path,
        environment: &FetchEnvironment,
    ) -> Result<RepositoryDirectoryValue> {
        let started = Instant::now();
        report(
            environment,
            FetchEvent::Started {
                repository: rule.name().to_string(),
                kind: rule.kind().to_string(),
            },
        );

        match self.attempt(rule, output_directory, environment).await {
            Ok(value) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(rule = rule.name(), path = %value.path().display(), duration_ms, "Repository fetched");
                report(
                    environment,
                    FetchEvent::Completed {
                        repository: rule.name().to_string(),
                        path: value.path().display().to_string(),
                        duration_ms,
                    },
                );
                Ok(value)
            }
            Err(failure) => {
                let repository = rule.name().to_string();
                let message = failure.to_string();
                if failure.is_transient() {
                    tracing::warn!(rule = rule.name(), error = %message, "Transient fetch failure");
                    report(environment, FetchEvent::Retryable { repository, message });
                } else {
                    tracing::error!(rule = rule.name(), error = %message, "Fetch failed");
                    report(environment, FetchEvent::Failed { repository, message });
                }
                Err(failure.for_rule(rule.name()))
            }
        }
    }

    async fn attempt(
        &self,
        rule: &RepositoryRule,
        output_directory: &Path,
        environment: &FetchEnvironment,
    ) -> std::result::Result<RepositoryDirectoryValue, Failure> {
        rule.check_name()?;
        marker::clear(&self.layout, rule.name()).await?;
        prepare_directory(output_directory).await?;

        check_cancelled(environment, FetchPhase::Download)?;
        let archive = tokio::select! {
            biased;
            () = environment.cancellation().cancelled() => Err(Failure::interrupted(FetchPhase::Download)),
            result = self.downloader.download(
                rule,
                output_directory,
                environment.events(),
                environment.client_env(),
            ) => result,
        }?;
        tracing::debug!(rule = rule.name(), archive = %archive.display(), "Archive downloaded");

        let descriptor =
            ArchiveDescriptor::for_rule(rule, &rule.mapper(), &archive, output_directory)?;

        check_cancelled(environment, FetchPhase::Extraction)?;
        let summary = self.decompress(&descriptor, environment).await?;

        check_cancelled(environment, FetchPhase::Finalize)?;
        remove_archive(&archive, output_directory, &summary).await?;
        marker::write(&self.layout, rule).await?;

        Ok(RepositoryDirectoryValue::new(output_directory))
    }

    async fn decompress(
        &self,
        descriptor: &ArchiveDescriptor,
        environment: &FetchEnvironment,
    ) -> std::result::Result<ExtractionSummary, Failure> {
        let format = self
            .decompressor
            .detect_format(descriptor)
            .map_or_else(|| "unknown".to_string(), |f| f.to_string());
        report(
            environment,
            FetchEvent::Extracting {
                repository: descriptor.target_name().to_string(),
                archive: descriptor.archive_path().display().to_string(),
                format,
            },
        );

        let decompressor = Arc::clone(&self.decompressor);
        let interrupt = environment.cancellation().clone();
        let owned = descriptor.clone();
        let summary = tokio::task::spawn_blocking(move || decompressor.decompress(&owned, &interrupt))
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    Failure::interrupted(FetchPhase::Extraction)
                } else {
                    Failure::io_no_path(std::io::Error::other(e.to_string()), "run extraction worker")
                }
            })??;

        report(
            environment,
            FetchEvent::Extracted {
                repository: descriptor.target_name().to_string(),
                entries: summary.entries,
            },
        );
        Ok(summary)
    }
}

/// Start every attempt from an empty directory.
///
/// Only reached when the marker is absent or stale, so whatever is there is
/// left over from an incomplete or outdated attempt.
async fn prepare_directory(output_directory: &Path) -> std::result::Result<(), Failure> {
    match tokio::fs::remove_dir_all(output_directory).await {
        Ok(()) => {
            tracing::debug!(path = %output_directory.display(), "Removed stale repository contents");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(Failure::io(e, output_directory, "remove stale directory")),
    }
    tokio::fs::create_dir_all(output_directory)
        .await
        .map_err(|e| Failure::io(e, output_directory, "create directory"))
}

/// Delete the downloaded archive unless extraction placed an entry of the
/// same name, or the downloader put it outside the repository directory.
async fn remove_archive(
    archive: &Path,
    output_directory: &Path,
    summary: &ExtractionSummary,
) -> std::result::Result<(), Failure> {
    if archive.parent() != Some(output_directory) {
        return Ok(());
    }
    let Some(name) = archive.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    if summary.placed(name) {
        return Ok(());
    }
    match tokio::fs::remove_file(archive).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Failure::io(e, archive, "remove archive")),
    }
}

fn check_cancelled(
    environment: &FetchEnvironment,
    phase: FetchPhase,
) -> std::result::Result<(), Failure> {
    if environment.is_cancelled() {
        tracing::debug!(%phase, "Fetch cancelled");
        Err(Failure::interrupted(phase))
    } else {
        Ok(())
    }
}

fn report(environment: &FetchEnvironment, event: FetchEvent) {
    environment
        .events()
        .report(EVENT_TARGET, EventCategory::Fetch(event));
}
