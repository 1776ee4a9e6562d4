//! Collaborator interfaces for fetching one repository.
//!
//! The core never talks to the network or parses archive formats itself. It
//! sequences a [`Downloader`] and a [`Decompressor`] through the
//! [`RepositoryFetcher`] and classifies what they report.

pub mod orchestrator;

pub use orchestrator::RepositoryFetcher;

use async_trait::async_trait;
use repofetch_events::EventSender;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::descriptor::{ArchiveDescriptor, ArchiveFormat};
use crate::environment::ClientEnvironment;
use crate::error::Failure;
use crate::rule::RepositoryRule;

/// Retrieves the archive for a rule into a local path.
///
/// Implementations own checksum verification, retry/backoff and mirror
/// fallback, and return failures already classified.
///
/// # Example
///
/// ```ignore
/// pub struct HttpDownloader { /* ... */ }
///
/// #[async_trait]
/// impl Downloader for HttpDownloader {
///     fn environment_variables(&self) -> &[&str] { &["HTTPS_PROXY"] }
///     // ...
/// }
/// ```
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download the archive for `rule` into `output_dir`.
    ///
    /// Only variables present in `client_env` may influence the download.
    ///
    /// # Errors
    ///
    /// Returns a transient failure for network or disk problems and a
    /// persistent one for checksum mismatches or malformed attributes.
    async fn download(
        &self,
        rule: &RepositoryRule,
        output_dir: &Path,
        events: &EventSender,
        client_env: &ClientEnvironment,
    ) -> Result<PathBuf, Failure>;

    /// Names of the environment variables this downloader reads.
    ///
    /// The evaluator snapshots exactly these before a fetch is attempted.
    fn environment_variables(&self) -> &[&str];
}

/// What a decompressor placed in the repository directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Format that was unpacked.
    pub format: ArchiveFormat,
    /// Number of files, directories and links written.
    pub entries: usize,
    /// Names placed at the root of the repository directory.
    pub top_level: Vec<String>,
}

impl ExtractionSummary {
    /// Whether extraction placed a top-level entry called `name`.
    #[must_use]
    pub fn placed(&self, name: &str) -> bool {
        self.top_level.iter().any(|entry| entry == name)
    }
}

/// Unpacks one archive described by an [`ArchiveDescriptor`].
///
/// Runs on a blocking worker thread. Implementations check `interrupt`
/// between entries and stop with [`Failure::interrupted`] once it fires.
pub trait Decompressor: Send + Sync {
    /// Unpack the descriptor's archive into its repository directory.
    ///
    /// # Errors
    ///
    /// Corrupt archives, unsupported formats, unsafe entries and a missing
    /// strip prefix are persistent. I/O failures while writing are transient.
    fn decompress(
        &self,
        descriptor: &ArchiveDescriptor,
        interrupt: &CancellationToken,
    ) -> Result<ExtractionSummary, Failure>;

    /// Best guess at the format that will be unpacked, for progress reporting.
    fn detect_format(&self, descriptor: &ArchiveDescriptor) -> Option<ArchiveFormat> {
        descriptor.format()
    }
}
