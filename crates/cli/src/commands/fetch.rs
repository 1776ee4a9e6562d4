//! `repofetch fetch`: materialize repositories and print their directories.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use super::CommandContext;
use crate::cli::{CliError, EXIT_FAILED, EXIT_OK, EXIT_TEMPFAIL, ErrorEnvelope, OkEnvelope};
use miette::Report;
use repofetch_archive::DecompressorRegistry;
use repofetch_core::{
    EvaluationReport, Evaluator, RepositoryFetcher, RepositoryNode, RuleOutcome,
};
use repofetch_events::{CliRenderer, CliRendererConfig, EventBus, JsonRenderer};
use repofetch_http::HttpDownloader;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Options for one fetch invocation.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Rule names; empty means every declared rule.
    pub rules: Vec<String>,
    /// In-run retries for transient failures.
    pub retries: u32,
    /// Show download progress and extraction detail.
    pub verbose: bool,
}

/// Per-rule line of the JSON result.
#[derive(Debug, Serialize)]
struct RepositoryResult {
    name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct FetchSummary {
    repositories: Vec<RepositoryResult>,
    succeeded: usize,
    retryable: usize,
    failed: usize,
}

/// Fetch the selected rules and report each outcome.
///
/// Events are rendered while the evaluation runs; results are printed once
/// the renderer has drained, one `name<TAB>path` line per materialized
/// repository.
///
/// # Errors
///
/// Returns [`CliError::Config`] if a requested rule is not declared.
pub async fn execute(
    ctx: &CommandContext,
    options: &FetchOptions,
    cancellation: CancellationToken,
) -> Result<i32, CliError> {
    let rules = ctx.workspace().select(&options.rules)?;

    let bus = EventBus::new();
    let receiver = bus.subscribe();
    let renderer = if ctx.json() {
        tokio::spawn(JsonRenderer::new().run(receiver))
    } else {
        let config = CliRendererConfig {
            verbose: options.verbose,
            ..CliRendererConfig::default()
        };
        tokio::spawn(CliRenderer::with_config(config).run(receiver))
    };
    let events = bus
        .sender()
        .ok_or_else(|| CliError::other("event bus closed before the fetch started"))?;

    let fetcher = RepositoryFetcher::new(
        Arc::new(HttpDownloader::default()),
        Arc::new(DecompressorRegistry::default()),
        ctx.layout().clone(),
    );
    let evaluator = Evaluator::new(RepositoryNode::new(Arc::new(fetcher)), events, cancellation)
        .with_max_transient_retries(options.retries);

    let report = evaluator.evaluate(&rules).await;

    // The renderer finishes once every sender and the bus itself are gone.
    drop(evaluator);
    bus.shutdown();
    drop(bus);
    if let Err(e) = renderer.await {
        tracing::warn!(error = %e, "Event renderer task failed");
    }

    let report = report?;
    let code = exit_code(&report);
    if ctx.json() {
        print_json(report, code);
    } else {
        print_text(report);
    }
    Ok(code)
}

/// Exit code for a finished evaluation.
///
/// Persistent failures dominate; a run with only transient failures exits
/// with [`EXIT_TEMPFAIL`] since running it again may succeed.
#[must_use]
pub fn exit_code(report: &EvaluationReport) -> i32 {
    if report.failed() > 0 {
        EXIT_FAILED
    } else if report.retryable() > 0 {
        EXIT_TEMPFAIL
    } else {
        EXIT_OK
    }
}

fn print_text(report: EvaluationReport) {
    for (name, outcome) in report.outcomes {
        match outcome {
            RuleOutcome::Fetched(value) => println!("{name}\t{}", value.path().display()),
            RuleOutcome::Retryable(error) | RuleOutcome::Failed(error) => {
                eprintln!("{:?}", Report::new(error));
            }
        }
    }
}

fn print_json(report: EvaluationReport, code: i32) {
    let summary = FetchSummary {
        succeeded: report.succeeded(),
        retryable: report.retryable(),
        failed: report.failed(),
        repositories: report
            .outcomes
            .into_iter()
            .map(|(name, outcome)| match outcome {
                RuleOutcome::Fetched(value) => RepositoryResult {
                    name,
                    status: "fetched",
                    path: Some(value.path().display().to_string()),
                    error: None,
                },
                RuleOutcome::Retryable(error) => RepositoryResult {
                    name,
                    status: "retryable",
                    path: None,
                    error: Some(error.to_string()),
                },
                RuleOutcome::Failed(error) => RepositoryResult {
                    name,
                    status: "failed",
                    path: None,
                    error: Some(error.to_string()),
                },
            })
            .collect(),
    };

    let line = if code == EXIT_OK {
        serde_json::to_string(&OkEnvelope::new(summary))
    } else {
        serde_json::to_string(&ErrorEnvelope::new(summary))
    };
    match line {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing fetch result: {e}"),
    }
}
