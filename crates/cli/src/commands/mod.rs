//! Subcommand implementations.
//!
//! Every command starts from a [`CommandContext`]: the parsed workspace file
//! and the directory layout repositories are materialized in.

pub mod clean;
pub mod fetch;
pub mod path;

use crate::cli::CliError;
use repofetch_core::{ExternalLayout, Workspace};
use std::path::Path;

/// Workspace and layout shared by all subcommands.
#[derive(Debug)]
pub struct CommandContext {
    workspace: Workspace,
    layout: ExternalLayout,
    json: bool,
}

impl CommandContext {
    /// Load the workspace file and resolve the output base.
    ///
    /// Without an explicit output base the platform cache directory is used.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] if the workspace file cannot be loaded or
    /// the output base cannot be determined.
    pub fn load(
        workspace_file: &Path,
        output_base: Option<&Path>,
        json: bool,
    ) -> Result<Self, CliError> {
        let workspace = Workspace::load(workspace_file)?;
        let layout = match output_base {
            Some(base) => ExternalLayout::new(base)?,
            None => ExternalLayout::from_env()?,
        };
        tracing::debug!(
            workspace = %workspace_file.display(),
            external = %layout.root().display(),
            rules = workspace.rules().len(),
            "Loaded workspace"
        );
        Ok(Self {
            workspace,
            layout,
            json,
        })
    }

    /// The parsed workspace file.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Where repositories are materialized.
    #[must_use]
    pub fn layout(&self) -> &ExternalLayout {
        &self.layout
    }

    /// Whether output is JSON.
    #[must_use]
    pub fn json(&self) -> bool {
        self.json
    }
}
