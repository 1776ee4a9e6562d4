//! Error taxonomy for repository fetches.
//!
//! Every failure is either [`Failure::Transient`] (caused by the environment;
//! the evaluator may attempt the fetch again later) or [`Failure::Persistent`]
//! (caused by the rule itself; retrying with the same inputs cannot succeed).
//! Collaborators return a [`Failure`]; the fetcher attaches the rule name with
//! [`Failure::for_rule`], which preserves the classification.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for repository fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The step of a fetch a failure or interruption happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPhase {
    /// Creating the output directory.
    Directory,
    /// Retrieving the archive.
    Download,
    /// Building the archive descriptor.
    Descriptor,
    /// Unpacking the archive.
    Extraction,
    /// Removing the archive and writing the completion marker.
    Finalize,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Directory => "directory creation",
            Self::Download => "download",
            Self::Descriptor => "descriptor construction",
            Self::Extraction => "extraction",
            Self::Finalize => "finalization",
        };
        f.write_str(name)
    }
}

/// Environmental causes that may not recur.
#[derive(Error, Debug)]
pub enum TransientCause {
    /// Local filesystem failure.
    #[error("I/O {operation} failed{}: {source}", path.as_ref().map_or(String::new(), |p| format!(" for {}", p.display())))]
    Io {
        /// Operation that failed (e.g., "create directory", "write").
        operation: String,
        /// Path involved, if known.
        path: Option<PathBuf>,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Network-level failure (connect, reset, timeout).
    #[error("network error fetching {url}: {message}")]
    Network {
        /// URL being fetched.
        url: String,
        /// Transport error description.
        message: String,
    },

    /// A server answered with a status worth retrying (5xx, 408, 429).
    #[error("{url} answered HTTP {status}")]
    HttpStatus {
        /// URL being fetched.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The environment's cancellation signal fired.
    #[error("interrupted during {phase}")]
    Interrupted {
        /// Step that was interrupted.
        phase: FetchPhase,
    },
}

/// Causes rooted in the rule declaration itself.
#[derive(Error, Debug)]
pub enum PersistentCause {
    /// Downloaded bytes do not match the declared checksum.
    #[error("checksum mismatch for {url}: expected sha256 {expected}, got {actual}")]
    ChecksumMismatch {
        /// URL the bytes came from.
        url: String,
        /// Declared sha256.
        expected: String,
        /// Observed sha256.
        actual: String,
    },

    /// An attribute has the wrong type or an invalid value.
    #[error("attribute '{attribute}' must be {expected}, got {actual}")]
    InvalidAttribute {
        /// Attribute name.
        attribute: String,
        /// Description of what was expected.
        expected: String,
        /// Description of what was found.
        actual: String,
    },

    /// A required attribute is missing.
    #[error("missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Attribute name.
        attribute: String,
    },

    /// A declared URL cannot be parsed or uses an unsupported scheme.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The URL as written.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// A server answered with a client error; the URL in the rule is wrong.
    #[error("{url} answered HTTP {status}")]
    HttpStatus {
        /// URL being fetched.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// No decompressor handles this archive.
    #[error("unsupported archive format: {}", archive.display())]
    UnsupportedFormat {
        /// Archive path.
        archive: PathBuf,
    },

    /// The archive could not be parsed.
    #[error("corrupt archive {}: {message}", archive.display())]
    CorruptArchive {
        /// Archive path.
        archive: PathBuf,
        /// Parser error description.
        message: String,
    },

    /// `strip_prefix` names a path that is not in the archive.
    #[error("prefix '{prefix}' was given, but not found in the archive {} (top-level entries: {})", archive.display(), found.join(", "))]
    MissingPrefix {
        /// Requested prefix.
        prefix: String,
        /// Archive path.
        archive: PathBuf,
        /// Top-level entries that do exist.
        found: Vec<String>,
    },

    /// An entry would be written outside the repository directory.
    #[error("archive entry '{entry}' escapes the repository directory")]
    UnsafeEntry {
        /// Offending entry path.
        entry: String,
    },

    /// The rule name cannot be used as a directory under the external root.
    #[error("invalid repository name '{name}': {reason}")]
    InvalidName {
        /// Declared name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },
}

/// A classified failure reported by a collaborator.
#[derive(Error, Debug)]
pub enum Failure {
    /// Retry-worthy failure caused by the environment.
    #[error(transparent)]
    Transient(#[from] TransientCause),
    /// Failure caused by rule content.
    #[error(transparent)]
    Persistent(#[from] PersistentCause),
}

impl Failure {
    /// Create a transient I/O failure with path context.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Transient(TransientCause::Io {
            operation: operation.into(),
            path: Some(path.as_ref().to_path_buf()),
            source,
        })
    }

    /// Create a transient I/O failure without path context.
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Transient(TransientCause::Io {
            operation: operation.into(),
            path: None,
            source,
        })
    }

    /// Create a transient interruption failure.
    #[must_use]
    pub fn interrupted(phase: FetchPhase) -> Self {
        Self::Transient(TransientCause::Interrupted { phase })
    }

    /// Create a persistent attribute type/value failure.
    #[must_use]
    pub fn invalid_attribute(
        attribute: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Persistent(PersistentCause::InvalidAttribute {
            attribute: attribute.into(),
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Create a persistent missing-attribute failure.
    #[must_use]
    pub fn missing_attribute(attribute: impl Into<String>) -> Self {
        Self::Persistent(PersistentCause::MissingAttribute {
            attribute: attribute.into(),
        })
    }

    /// Create a persistent invalid-name failure.
    #[must_use]
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistent(PersistentCause::InvalidName {
            name: name.into(),
            reason: reason.into(),
        })
    }

    /// Whether a later attempt may succeed without changing the rule.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this failure is an interruption rather than a real error.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Transient(TransientCause::Interrupted { .. }))
    }

    /// Attach the rule name, keeping the classification unchanged.
    #[must_use]
    pub fn for_rule(self, rule: impl Into<String>) -> Error {
        let rule = rule.into();
        match self {
            Self::Transient(cause) => Error::Transient { rule, cause },
            Self::Persistent(cause) => Error::Persistent { rule, cause },
        }
    }
}

/// A classified failure scoped to one repository rule.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The fetch may succeed on a later evaluation.
    #[error("Transient failure fetching repository '{rule}': {cause}")]
    #[diagnostic(
        code(repofetch::fetch::transient),
        help("This is usually a network or disk problem; run the fetch again")
    )]
    Transient {
        /// Rule name.
        rule: String,
        /// What went wrong.
        #[source]
        cause: TransientCause,
    },

    /// The rule must be corrected before the fetch can succeed.
    #[error("Error fetching repository '{rule}': {cause}")]
    #[diagnostic(
        code(repofetch::fetch::persistent),
        help("Fix the rule declaration in the workspace file; retrying will not help")
    )]
    Persistent {
        /// Rule name.
        rule: String,
        /// What is wrong with the rule.
        #[source]
        cause: PersistentCause,
    },
}

impl Error {
    /// Name of the rule that failed.
    #[must_use]
    pub fn rule(&self) -> &str {
        match self {
            Self::Transient { rule, .. } | Self::Persistent { rule, .. } => rule,
        }
    }

    /// Whether a later attempt may succeed without changing the rule.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error is an interruption rather than a real failure.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Transient {
                cause: TransientCause::Interrupted { .. },
                ..
            }
        )
    }
}

/// Errors in the workspace file that declares rules.
#[derive(Error, Debug, Diagnostic)]
pub enum WorkspaceError {
    /// The workspace file could not be read.
    #[error("Failed to read workspace file {}", path.display())]
    #[diagnostic(
        code(repofetch::workspace::io),
        help("Check that the file exists and is readable")
    )]
    Io {
        /// Workspace file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The workspace file is not valid TOML.
    #[error("Failed to parse workspace file {}", path.display())]
    #[diagnostic(code(repofetch::workspace::parse))]
    Parse {
        /// Workspace file path.
        path: PathBuf,
        /// The TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A rule declaration is structurally invalid.
    #[error("Invalid rule #{index} in [[{kind}]]: {message}")]
    #[diagnostic(code(repofetch::workspace::rule))]
    InvalidRule {
        /// Rule kind table.
        kind: String,
        /// Zero-based position in the array of tables.
        index: usize,
        /// What is wrong.
        message: String,
    },

    /// Two rules share a name.
    #[error("Repository '{name}' is declared more than once")]
    #[diagnostic(
        code(repofetch::workspace::duplicate),
        help("Repository names must be unique; they map to directories under the external root")
    )]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// A name was requested that no rule declares.
    #[error("No repository named '{name}' is declared")]
    #[diagnostic(code(repofetch::workspace::unknown))]
    UnknownRule {
        /// Requested name.
        name: String,
    },

    /// The output base could not be determined.
    #[error("Could not determine output base: {message}")]
    #[diagnostic(
        code(repofetch::workspace::output_base),
        help("Set REPOFETCH_OUTPUT_BASE or pass --output-base")
    )]
    OutputBase {
        /// Why resolution failed.
        message: String,
    },
}
