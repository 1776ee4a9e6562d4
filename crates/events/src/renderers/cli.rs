//! CLI renderer for repofetch events.
//!
//! Renders events to stdout/stderr for terminal display.
//! This module is allowed to use println!/eprintln! as it's the output layer.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use crate::bus::EventReceiver;
use crate::event::{EvaluationEvent, EventCategory, FetchEvent, OutputEvent, RepofetchEvent};
use std::io::{self, IsTerminal};

/// CLI renderer configuration.
#[derive(Debug, Clone)]
pub struct CliRendererConfig {
    /// Whether to use ANSI colors.
    pub colors: bool,
    /// Whether to show verbose output (download progress, extraction detail).
    pub verbose: bool,
}

impl Default for CliRendererConfig {
    fn default() -> Self {
        Self {
            colors: io::stderr().is_terminal(),
            verbose: false,
        }
    }
}

/// CLI renderer that outputs events to stdout/stderr.
#[derive(Debug)]
pub struct CliRenderer {
    config: CliRendererConfig,
}

impl CliRenderer {
    /// Create a new CLI renderer with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CliRendererConfig::default(),
        }
    }

    /// Create a new CLI renderer with the given configuration.
    #[must_use]
    pub fn with_config(config: CliRendererConfig) -> Self {
        Self { config }
    }

    /// Run the renderer, consuming events from the receiver.
    pub async fn run(self, mut receiver: EventReceiver) {
        while let Some(event) = receiver.recv().await {
            self.render(&event);
        }
    }

    /// Render a single event.
    pub fn render(&self, event: &RepofetchEvent) {
        if let EventCategory::Output(OutputEvent::Stdout { content }) = &event.category {
            println!("{content}");
            return;
        }
        if let Some(line) = self.format(event) {
            eprintln!("{line}");
        }
    }

    /// Format an event as a single terminal line, or `None` if it is hidden
    /// at the current verbosity.
    #[must_use]
    pub fn format(&self, event: &RepofetchEvent) -> Option<String> {
        match &event.category {
            EventCategory::Fetch(fetch) => self.format_fetch(fetch),
            EventCategory::Evaluation(evaluation) => self.format_evaluation(evaluation),
            EventCategory::Output(OutputEvent::Stdout { content } | OutputEvent::Stderr { content }) => {
                Some(content.clone())
            }
        }
    }

    fn format_fetch(&self, event: &FetchEvent) -> Option<String> {
        let verbose = self.config.verbose;
        match event {
            FetchEvent::Started { repository, kind } => {
                verbose.then(|| format!("> [{repository}] fetching ({kind})"))
            }
            FetchEvent::CacheHit { repository, .. } => {
                Some(format!("> [{repository}] (up to date)"))
            }
            FetchEvent::DownloadStarted { repository, url } => {
                Some(format!("> [{repository}] downloading {url}"))
            }
            FetchEvent::DownloadProgress {
                repository,
                bytes,
                total,
                ..
            } => verbose.then(|| match total {
                Some(total) => format!("> [{repository}] {bytes}/{total} bytes"),
                None => format!("> [{repository}] {bytes} bytes"),
            }),
            FetchEvent::Downloaded {
                repository, sha256, ..
            } => verbose.then(|| format!("> [{repository}] downloaded (sha256 {sha256})")),
            FetchEvent::ChecksumMissing {
                repository,
                url,
                sha256,
            } => Some(self.paint(
                "33",
                &format!(
                    "warning: [{repository}] no sha256 declared for {url}; \
                     add sha256 = \"{sha256}\" to pin it"
                ),
            )),
            FetchEvent::Extracting {
                repository, format, ..
            } => verbose.then(|| format!("> [{repository}] extracting {format} archive")),
            FetchEvent::Extracted {
                repository,
                entries,
            } => verbose.then(|| format!("> [{repository}] extracted {entries} entries")),
            FetchEvent::Completed {
                repository,
                duration_ms,
                ..
            } => Some(format!("> [{repository}] done in {duration_ms}ms")),
            FetchEvent::Retryable {
                repository,
                message,
            } => Some(self.paint(
                "33",
                &format!("> [{repository}] will retry: {message}"),
            )),
            FetchEvent::Failed {
                repository,
                message,
            } => Some(self.paint("31", &format!("> [{repository}] failed: {message}"))),
        }
    }

    fn format_evaluation(&self, event: &EvaluationEvent) -> Option<String> {
        match event {
            EvaluationEvent::Started { rule_count } => self
                .config
                .verbose
                .then(|| format!("Evaluating {rule_count} repositories")),
            EvaluationEvent::Restarted {
                repository,
                attempt,
            } => self
                .config
                .verbose
                .then(|| format!("> [{repository}] restarting (invocation {attempt})")),
            EvaluationEvent::Completed {
                succeeded,
                retryable,
                failed,
                duration_ms,
            } => Some(format!(
                "{succeeded} fetched, {retryable} retryable, {failed} failed in {duration_ms}ms"
            )),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.config.colors {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

impl Default for CliRenderer {
    fn default() -> Self {
        Self::new()
    }
}
