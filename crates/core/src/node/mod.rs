//! Graph node contract for repository fetches.
//!
//! [`RepositoryNode`] translates between an incremental evaluator and the
//! [`RepositoryFetcher`]. It adds no policy: it asks the evaluator for the
//! environment variables the fetch depends on, short-circuits when the
//! repository is already materialized, and maps transient failures to
//! [`NodeError::Retry`] and persistent ones to [`NodeError::Fail`].

pub mod evaluator;

pub use evaluator::{EvaluationReport, Evaluator, RuleOutcome};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::Diagnostic;
use repofetch_events::{EventCategory, EventSender, FetchEvent};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::environment::{ClientEnvironment, FetchEnvironment};
use crate::error::Error;
use crate::fetch::RepositoryFetcher;
use crate::marker;
use crate::rule::RepositoryRule;

/// Node value: the root of a materialized repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryDirectoryValue {
    path: PathBuf,
}

impl RepositoryDirectoryValue {
    /// Wrap a repository directory.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The repository directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Result of one `compute` invocation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// The repository is materialized.
    Done(RepositoryDirectoryValue),
    /// A dependency is not available yet; invoke `compute` again once the
    /// evaluator has resolved it.
    Restart,
}

/// The evaluator's two failure outcomes.
#[derive(Error, Debug, Diagnostic)]
pub enum NodeError {
    /// Try this node again on a later evaluation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Retry(Error),
    /// Fail this node and surface the error to the user.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fail(Error),
}

impl NodeError {
    /// The underlying classified error.
    #[must_use]
    pub fn error(&self) -> &Error {
        match self {
            Self::Retry(error) | Self::Fail(error) => error,
        }
    }

    /// Consume into the underlying classified error.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::Retry(error) | Self::Fail(error) => error,
        }
    }

    /// Whether the evaluator may try again later.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

impl From<Error> for NodeError {
    fn from(error: Error) -> Self {
        if error.is_transient() {
            Self::Retry(error)
        } else {
            Self::Fail(error)
        }
    }
}

/// What the evaluator exposes to a node computation.
pub trait GraphEnvironment: Send + Sync {
    /// Fire-and-forget event sink.
    fn events(&self) -> &EventSender;

    /// Cancellation signal for the current evaluation.
    fn cancellation(&self) -> &CancellationToken;

    /// Snapshot of `names`, or `None` if the evaluator has not materialized
    /// them yet. Requesting names also declares them as dependencies.
    fn client_environment(&self, names: &[&str]) -> Option<ClientEnvironment>;
}

/// Exposes a [`RepositoryFetcher`] as a restartable graph node.
#[derive(Debug, Clone)]
pub struct RepositoryNode {
    fetcher: Arc<RepositoryFetcher>,
}

impl RepositoryNode {
    /// Create a node over `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<RepositoryFetcher>) -> Self {
        Self { fetcher }
    }

    /// The fetcher this node drives.
    #[must_use]
    pub fn fetcher(&self) -> &RepositoryFetcher {
        &self.fetcher
    }

    /// Compute the repository directory for `rule`.
    ///
    /// May be invoked several times for the same rule; nothing is carried
    /// between invocations except what is on disk.
    ///
    /// # Errors
    ///
    /// [`NodeError::Retry`] wraps transient fetch errors and
    /// [`NodeError::Fail`] wraps persistent ones, both unchanged. A name that
    /// is not a single path component fails before anything touches disk.
    pub async fn compute(
        &self,
        rule: &RepositoryRule,
        env: &dyn GraphEnvironment,
    ) -> Result<NodeOutcome, NodeError> {
        // The name becomes a directory under the external root.
        if let Err(failure) = rule.check_name() {
            return Err(NodeError::from(failure.for_rule(rule.name())));
        }

        let Some(client_env) = env.client_environment(self.fetcher.environment_variables()) else {
            tracing::debug!(rule = rule.name(), "Client environment not ready, restarting");
            return Ok(NodeOutcome::Restart);
        };

        let layout = self.fetcher.layout();
        let output_directory = layout.repository_dir(rule.name());

        if marker::is_complete(layout, rule).await {
            tracing::debug!(rule = rule.name(), "Repository already materialized");
            env.events().report(
                "repofetch::node",
                EventCategory::Fetch(FetchEvent::CacheHit {
                    repository: rule.name().to_string(),
                    path: output_directory.display().to_string(),
                }),
            );
            return Ok(NodeOutcome::Done(RepositoryDirectoryValue::new(
                output_directory,
            )));
        }

        let fetch_env = FetchEnvironment::new(
            env.events().clone(),
            client_env,
            env.cancellation().clone(),
        );
        self.fetcher
            .fetch(rule, &output_directory, &fetch_env)
            .await
            .map(NodeOutcome::Done)
            .map_err(NodeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Failure, FetchPhase};

    #[test]
    fn test_transient_maps_to_retry() {
        let error = Failure::interrupted(FetchPhase::Download).for_rule("png");
        let node_error = NodeError::from(error);
        assert!(node_error.is_retry());
        assert_eq!(node_error.error().rule(), "png");
    }

    #[test]
    fn test_persistent_maps_to_fail() {
        let error = Failure::missing_attribute("url").for_rule("png");
        let node_error = NodeError::from(error);
        assert!(!node_error.is_retry());
        assert!(!node_error.into_error().is_transient());
    }

    #[test]
    fn test_node_error_keeps_message() {
        let error = Failure::missing_attribute("url").for_rule("png");
        let expected = error.to_string();
        assert_eq!(NodeError::from(error).to_string(), expected);
    }
}
