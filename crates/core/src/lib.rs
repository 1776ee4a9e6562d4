//! Core of repofetch: materializes external repositories as nodes of an
//! incremental build graph.
//!
//! Given a [`RepositoryRule`] describing a remote archive, the
//! [`RepositoryFetcher`] creates the repository directory, delegates the
//! download to a [`Downloader`], builds an [`ArchiveDescriptor`], and delegates
//! unpacking to a [`Decompressor`]. The [`RepositoryNode`] exposes this as a
//! restartable node computation, and the [`Evaluator`] drives nodes for many
//! rules with memoization.
//!
//! # Key Types
//!
//! - [`RepositoryRule`] and [`RuleAttributes`]: declared rules and typed
//!   attribute access
//! - [`Failure`] and [`Error`]: the transient/persistent error taxonomy
//! - [`ExternalLayout`]: deterministic on-disk paths per rule name
//! - [`GraphEnvironment`]: what an evaluator provides to a node
//!
//! # Example
//!
//! ```ignore
//! use repofetch_core::{Evaluator, ExternalLayout, RepositoryFetcher, RepositoryNode, Workspace};
//!
//! let workspace = Workspace::load("WORKSPACE.toml")?;
//! let fetcher = RepositoryFetcher::new(downloader, decompressor, ExternalLayout::from_env()?);
//! let evaluator = Evaluator::new(RepositoryNode::new(Arc::new(fetcher)), events, token);
//! let report = evaluator.evaluate(workspace.rules()).await?;
//! ```

pub mod descriptor;
pub mod environment;
pub mod error;
pub mod fetch;
pub mod marker;
pub mod node;
pub mod paths;
pub mod rule;
pub mod workspace;

pub use descriptor::{ArchiveDescriptor, ArchiveDescriptorBuilder, ArchiveFormat};
pub use environment::{ClientEnvironment, FetchEnvironment};
pub use error::{Error, Failure, FetchPhase, PersistentCause, Result, TransientCause, WorkspaceError};
pub use fetch::{Decompressor, Downloader, ExtractionSummary, RepositoryFetcher};
pub use node::evaluator::EnvironmentSource;
pub use node::{
    EvaluationReport, Evaluator, GraphEnvironment, NodeError, NodeOutcome,
    RepositoryDirectoryValue, RepositoryNode, RuleOutcome,
};
pub use paths::{ExternalLayout, default_output_base};
pub use rule::{AttributeValue, RepositoryRule, RuleAttributes};
pub use workspace::{WORKSPACE_FILE, Workspace, WorkspaceAttributeMapper};
