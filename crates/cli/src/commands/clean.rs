//! `repofetch clean`: forget materialized repositories.

use super::CommandContext;
use crate::cli::{CliError, OkEnvelope};
use repofetch_core::{ExternalLayout, Failure, marker};
use std::io::ErrorKind;
use std::path::Path;

/// Remove the marker, repository directory and staging directory of each
/// selected rule. Returns the cleaned rule names in declaration order.
///
/// The marker goes first so an interrupted clean never leaves a marker
/// claiming a half-removed directory is complete.
///
/// # Errors
///
/// Returns [`CliError::Config`] for undeclared rules and
/// [`CliError::Other`] if anything cannot be removed.
pub async fn execute(ctx: &CommandContext, rules: &[String]) -> Result<Vec<String>, CliError> {
    let selected = ctx.workspace().select(rules)?;
    let mut cleaned = Vec::with_capacity(selected.len());
    for rule in &selected {
        clean_one(ctx.layout(), rule.name())
            .await
            .map_err(|failure| CliError::other(failure.for_rule(rule.name()).to_string()))?;
        tracing::info!(rule = rule.name(), "Cleaned repository");
        cleaned.push(rule.name().to_string());
    }
    Ok(cleaned)
}

async fn clean_one(layout: &ExternalLayout, name: &str) -> Result<(), Failure> {
    marker::clear(layout, name).await?;
    remove_dir(&layout.repository_dir(name)).await?;
    remove_dir(&layout.staging_dir(name)).await
}

async fn remove_dir(dir: &Path) -> Result<(), Failure> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Failure::io(e, dir, "remove directory")),
    }
}

/// Text or JSON rendering of the cleaned names.
///
/// # Errors
///
/// Returns [`CliError::Other`] if JSON serialization fails.
pub fn render(cleaned: &[String], json: bool) -> Result<String, CliError> {
    if json {
        serde_json::to_string(&OkEnvelope::new(serde_json::json!({ "cleaned": cleaned })))
            .map_err(|e| CliError::other(format!("Failed to serialize result: {e}")))
    } else {
        Ok(cleaned.join("\n"))
    }
}
