//! Event type definitions for structured repofetch events.
//!
//! Events are categorized by domain (repository fetches, graph evaluation,
//! plain output) and carry enough metadata to be correlated across one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured repofetch event with full metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepofetchEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Correlation ID for request tracing across operations.
    pub correlation_id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Source information for the event.
    pub source: EventSource,
    /// The event category and data.
    pub category: EventCategory,
}

impl RepofetchEvent {
    /// Create a new event with the given category.
    #[must_use]
    pub fn new(correlation_id: Uuid, source: EventSource, category: EventCategory) -> Self {
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            timestamp: Utc::now(),
            source,
            category,
        }
    }

    /// Name of the repository this event concerns, if any.
    #[must_use]
    pub fn repository(&self) -> Option<&str> {
        match &self.category {
            EventCategory::Fetch(event) => Some(event.repository()),
            EventCategory::Evaluation(EvaluationEvent::Restarted { repository, .. }) => {
                Some(repository)
            }
            _ => None,
        }
    }
}

/// Source information for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    /// The logical origin (e.g., "`repofetch::fetch`", "`repofetch::http`").
    pub target: String,
}

impl EventSource {
    /// Create a new event source.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Event categories organized by domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventCategory {
    /// Lifecycle of one repository fetch.
    Fetch(FetchEvent),
    /// Lifecycle of one graph evaluation over many rules.
    Evaluation(EvaluationEvent),
    /// Generic output events.
    Output(OutputEvent),
}

/// Repository fetch lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum FetchEvent {
    /// A fetch attempt started.
    Started {
        /// Repository (rule) name.
        repository: String,
        /// Rule kind, e.g. `http_archive`.
        kind: String,
    },
    /// The repository directory was already complete; nothing was fetched.
    CacheHit {
        /// Repository name.
        repository: String,
        /// Materialized directory.
        path: String,
    },
    /// Download of one URL started.
    DownloadStarted {
        /// Repository name.
        repository: String,
        /// URL being fetched.
        url: String,
    },
    /// Bytes received so far for one URL.
    DownloadProgress {
        /// Repository name.
        repository: String,
        /// URL being fetched.
        url: String,
        /// Bytes written to disk so far.
        bytes: u64,
        /// Content length announced by the server, if any.
        total: Option<u64>,
    },
    /// The archive is on disk and verified.
    Downloaded {
        /// Repository name.
        repository: String,
        /// Local archive path.
        path: String,
        /// Observed sha256 of the archive.
        sha256: String,
    },
    /// The rule declared no checksum; the observed one is reported so it can be pinned.
    ChecksumMissing {
        /// Repository name.
        repository: String,
        /// URL that was fetched.
        url: String,
        /// Observed sha256.
        sha256: String,
    },
    /// Unpacking started.
    Extracting {
        /// Repository name.
        repository: String,
        /// Archive being unpacked.
        archive: String,
        /// Detected archive format.
        format: String,
    },
    /// Unpacking finished.
    Extracted {
        /// Repository name.
        repository: String,
        /// Number of entries written.
        entries: usize,
    },
    /// The repository directory is complete.
    Completed {
        /// Repository name.
        repository: String,
        /// Materialized directory.
        path: String,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
    /// A transient failure; the fetch may be attempted again.
    Retryable {
        /// Repository name.
        repository: String,
        /// Human-readable cause.
        message: String,
    },
    /// A persistent failure; the rule must be fixed.
    Failed {
        /// Repository name.
        repository: String,
        /// Human-readable cause.
        message: String,
    },
}

impl FetchEvent {
    /// Repository name shared by every fetch event.
    #[must_use]
    pub fn repository(&self) -> &str {
        match self {
            Self::Started { repository, .. }
            | Self::CacheHit { repository, .. }
            | Self::DownloadStarted { repository, .. }
            | Self::DownloadProgress { repository, .. }
            | Self::Downloaded { repository, .. }
            | Self::ChecksumMissing { repository, .. }
            | Self::Extracting { repository, .. }
            | Self::Extracted { repository, .. }
            | Self::Completed { repository, .. }
            | Self::Retryable { repository, .. }
            | Self::Failed { repository, .. } => repository,
        }
    }
}

/// Graph evaluation events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum EvaluationEvent {
    /// Evaluation of a batch of rules started.
    Started {
        /// Number of rules requested.
        rule_count: usize,
    },
    /// A node asked to be re-entered once a missing input became available.
    Restarted {
        /// Repository name.
        repository: String,
        /// Invocation number (1-based) that requested the restart.
        attempt: u32,
    },
    /// Evaluation finished.
    Completed {
        /// Rules that produced a value.
        succeeded: usize,
        /// Rules left in a retryable state.
        retryable: usize,
        /// Rules that failed persistently.
        failed: usize,
        /// Duration in milliseconds.
        duration_ms: u64,
    },
}

/// Generic output events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutputEvent {
    /// Standard output content.
    Stdout {
        /// Output content.
        content: String,
    },
    /// Standard error content.
    Stderr {
        /// Output content.
        content: String,
    },
}
