//! Attempt-scoped environment handed to the fetcher.

use repofetch_events::EventSender;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Snapshot of the process environment variables a fetch may observe.
///
/// Taken once per attempt. Collaborators read variables from here, never from
/// the live process environment, so a concurrent change cannot tear a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEnvironment {
    vars: BTreeMap<String, String>,
}

impl ClientEnvironment {
    /// An empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current values of `names` from the process environment.
    ///
    /// Unset and non-unicode variables are omitted.
    #[must_use]
    pub fn capture<S: AsRef<str>>(names: &[S]) -> Self {
        let vars = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                std::env::var(name).ok().map(|value| (name.to_string(), value))
            })
            .collect();
        Self { vars }
    }

    /// Build a snapshot from explicit pairs.
    #[must_use]
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name`, if it was set when the snapshot was taken.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// First non-empty value among `names`.
    #[must_use]
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .find(|value| !value.is_empty())
    }

    /// A snapshot holding only the variables in `names`.
    #[must_use]
    pub fn restrict<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let vars = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.vars
                    .get(name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect();
        Self { vars }
    }

    /// Number of captured variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variables were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Everything one fetch attempt may use from its surroundings.
///
/// Built by the node for each attempt and never persisted.
#[derive(Debug, Clone)]
pub struct FetchEnvironment {
    events: EventSender,
    client_env: ClientEnvironment,
    cancellation: CancellationToken,
}

impl FetchEnvironment {
    /// Create an environment for one attempt.
    #[must_use]
    pub fn new(
        events: EventSender,
        client_env: ClientEnvironment,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            events,
            client_env,
            cancellation,
        }
    }

    /// Fire-and-forget event sink.
    #[must_use]
    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Permitted environment variables.
    #[must_use]
    pub fn client_env(&self) -> &ClientEnvironment {
        &self.client_env
    }

    /// Cancellation signal for this attempt.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the attempt has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
