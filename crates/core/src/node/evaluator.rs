//! A small memoizing evaluator that drives [`RepositoryNode`]s.
//!
//! Each rule runs an explicit restart loop: when the node asks for
//! environment variables that are not resolved yet it returns
//! [`NodeOutcome::Restart`], the evaluator captures the requested variables
//! and invokes the node again from scratch. Distinct rules are evaluated
//! concurrently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::future::join_all;
use repofetch_events::{EvaluationEvent, EventCategory, EventSender};
use tokio_util::sync::CancellationToken;

use super::{GraphEnvironment, NodeError, NodeOutcome, RepositoryDirectoryValue, RepositoryNode};
use crate::environment::ClientEnvironment;
use crate::error::{Error, WorkspaceError};
use crate::rule::RepositoryRule;

const EVENT_TARGET: &str = "repofetch::evaluator";

/// Where restarted nodes get their environment variables from.
#[derive(Debug, Clone, Default)]
pub enum EnvironmentSource {
    /// The live process environment, read once per requested variable.
    #[default]
    Process,
    /// A fixed set of values; anything not listed is unset.
    Fixed(ClientEnvironment),
}

impl EnvironmentSource {
    fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(name).ok(),
            Self::Fixed(env) => env.get(name).map(str::to_string),
        }
    }
}

/// Final state of one rule after an evaluation.
#[derive(Debug)]
pub enum RuleOutcome {
    /// The repository is materialized.
    Fetched(RepositoryDirectoryValue),
    /// Failed transiently; a later evaluation may succeed.
    Retryable(Error),
    /// Failed because of the rule; must be fixed by the user.
    Failed(Error),
}

impl RuleOutcome {
    /// The repository directory, if the fetch succeeded.
    #[must_use]
    pub fn value(&self) -> Option<&RepositoryDirectoryValue> {
        match self {
            Self::Fetched(value) => Some(value),
            Self::Retryable(_) | Self::Failed(_) => None,
        }
    }

    /// The error, if the fetch failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Fetched(_) => None,
            Self::Retryable(error) | Self::Failed(error) => Some(error),
        }
    }
}

/// Per-rule outcomes of one [`Evaluator::evaluate`] call, in input order.
#[derive(Debug)]
pub struct EvaluationReport {
    /// `(rule name, outcome)` pairs.
    pub outcomes: Vec<(String, RuleOutcome)>,
    /// Wall time of the evaluation.
    pub duration: Duration,
}

impl EvaluationReport {
    /// Outcome for `name`.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&RuleOutcome> {
        self.outcomes
            .iter()
            .find(|(rule, _)| rule == name)
            .map(|(_, outcome)| outcome)
    }

    /// Number of rules that were materialized.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Fetched(_)))
    }

    /// Number of rules that failed transiently.
    #[must_use]
    pub fn retryable(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Retryable(_)))
    }

    /// Number of rules that failed persistently.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RuleOutcome::Failed(_)))
    }

    /// Whether every rule was materialized.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.succeeded() == self.outcomes.len()
    }

    fn count(&self, predicate: impl Fn(&RuleOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Evaluation-scoped environment shared by all nodes of one evaluation.
struct EvaluationEnvironment<'a> {
    events: &'a EventSender,
    cancellation: &'a CancellationToken,
    source: &'a EnvironmentSource,
    resolved: Mutex<BTreeMap<String, Option<String>>>,
    pending: Mutex<BTreeSet<String>>,
}

impl<'a> EvaluationEnvironment<'a> {
    fn new(
        events: &'a EventSender,
        cancellation: &'a CancellationToken,
        source: &'a EnvironmentSource,
    ) -> Self {
        Self {
            events,
            cancellation,
            source,
            resolved: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Capture every variable a node asked for but did not get.
    fn resolve_pending(&self) {
        let names: Vec<String> = self
            .pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending).into_iter().collect())
            .unwrap_or_default();
        if let Ok(mut resolved) = self.resolved.lock() {
            for name in names {
                let value = self.source.lookup(&name);
                resolved.entry(name).or_insert(value);
            }
        }
    }
}

impl GraphEnvironment for EvaluationEnvironment<'_> {
    fn events(&self) -> &EventSender {
        self.events
    }

    fn cancellation(&self) -> &CancellationToken {
        self.cancellation
    }

    fn client_environment(&self, names: &[&str]) -> Option<ClientEnvironment> {
        let resolved = self.resolved.lock().ok()?;
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| !resolved.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            drop(resolved);
            if let Ok(mut pending) = self.pending.lock() {
                pending.extend(missing.into_iter().map(str::to_string));
            }
            return None;
        }
        Some(ClientEnvironment::from_pairs(names.iter().filter_map(|name| {
            resolved
                .get(*name)
                .and_then(Clone::clone)
                .map(|value| ((*name).to_string(), value))
        })))
    }
}

/// Memoizing evaluator over many repository rules.
///
/// Successful values are memoized by rule name for the evaluator's lifetime.
/// Transient failures are never memoized, so the next [`Evaluator::evaluate`]
/// call tries again.
#[derive(Debug)]
pub struct Evaluator {
    node: RepositoryNode,
    events: EventSender,
    cancellation: CancellationToken,
    source: EnvironmentSource,
    max_transient_retries: u32,
    memo: Mutex<HashMap<String, RepositoryDirectoryValue>>,
}

impl Evaluator {
    /// Create an evaluator driving `node`.
    #[must_use]
    pub fn new(node: RepositoryNode, events: EventSender, cancellation: CancellationToken) -> Self {
        Self {
            node,
            events,
            cancellation,
            source: EnvironmentSource::default(),
            max_transient_retries: 0,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Retry transient failures up to `retries` times within one evaluation.
    ///
    /// The default of 0 leaves retries to the next evaluation.
    #[must_use]
    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    /// Resolve requested environment variables from `source`.
    #[must_use]
    pub fn with_environment_source(mut self, source: EnvironmentSource) -> Self {
        self.source = source;
        self
    }

    /// Memoized value for `name`, if a previous evaluation produced one.
    #[must_use]
    pub fn memoized(&self, name: &str) -> Option<RepositoryDirectoryValue> {
        self.memo.lock().ok()?.get(name).cloned()
    }

    /// Drop the memoized value for `name`.
    pub fn invalidate(&self, name: &str) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.remove(name);
        }
    }

    /// Evaluate `rules` concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::DuplicateName`] if two rules share a name;
    /// nothing is fetched in that case.
    pub async fn evaluate(
        &self,
        rules: &[RepositoryRule],
    ) -> Result<EvaluationReport, WorkspaceError> {
        let mut seen = BTreeSet::new();
        for rule in rules {
            if !seen.insert(rule.name()) {
                return Err(WorkspaceError::DuplicateName {
                    name: rule.name().to_string(),
                });
            }
        }

        let started = Instant::now();
        self.report(EvaluationEvent::Started {
            rule_count: rules.len(),
        });

        let env = EvaluationEnvironment::new(&self.events, &self.cancellation, &self.source);
        let outcomes = join_all(rules.iter().map(|rule| self.evaluate_rule(rule, &env))).await;

        let report = EvaluationReport {
            outcomes: rules
                .iter()
                .map(|rule| rule.name().to_string())
                .zip(outcomes)
                .collect(),
            duration: started.elapsed(),
        };
        self.report(EvaluationEvent::Completed {
            succeeded: report.succeeded(),
            retryable: report.retryable(),
            failed: report.failed(),
            duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(report)
    }

    async fn evaluate_rule(&self, rule: &RepositoryRule, env: &EvaluationEnvironment<'_>) -> RuleOutcome {
        if let Some(value) = self.memoized(rule.name()) {
            tracing::debug!(rule = rule.name(), "Using memoized value");
            return RuleOutcome::Fetched(value);
        }

        let mut invocation: u32 = 1;
        let mut retries: u32 = 0;
        loop {
            match self.node.compute(rule, env).await {
                Ok(NodeOutcome::Done(value)) => {
                    if let Ok(mut memo) = self.memo.lock() {
                        memo.insert(rule.name().to_string(), value.clone());
                    }
                    return RuleOutcome::Fetched(value);
                }
                Ok(NodeOutcome::Restart) => {
                    env.resolve_pending();
                    invocation += 1;
                    self.report(EvaluationEvent::Restarted {
                        repository: rule.name().to_string(),
                        attempt: invocation,
                    });
                }
                Err(NodeError::Retry(error)) => {
                    let may_retry = retries < self.max_transient_retries
                        && !error.is_interrupted()
                        && !self.cancellation.is_cancelled();
                    if !may_retry {
                        return RuleOutcome::Retryable(error);
                    }
                    retries += 1;
                    invocation += 1;
                    tracing::info!(rule = rule.name(), retry = retries, "Retrying after transient failure");
                }
                Err(NodeError::Fail(error)) => return RuleOutcome::Failed(error),
            }
        }
    }

    fn report(&self, event: EvaluationEvent) {
        self.events
            .report(EVENT_TARGET, EventCategory::Evaluation(event));
    }
}
