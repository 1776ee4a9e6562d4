//! Command-line definition, CLI errors and exit codes.

use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use repofetch_core::WorkspaceError;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// At least one rule failed persistently
pub const EXIT_FAILED: i32 = 1;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Only transient failures remain; running again may succeed (EX_TEMPFAIL)
pub const EXIT_TEMPFAIL: i32 = 75;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Workspace file or argument problem (exit code 2)
    #[error("Configuration error: {message}")]
    #[diagnostic(code(repofetch::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Unexpected runtime error (exit code 1)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(repofetch::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

/// Workspace problems are configuration errors; the diagnostic's help is kept.
impl From<WorkspaceError> for CliError {
    fn from(err: WorkspaceError) -> Self {
        let help = err.help().map(|h| h.to_string());
        let message = match &err {
            WorkspaceError::Io { source, .. } => format!("{err}: {source}"),
            WorkspaceError::Parse { source, .. } => format!("{err}: {}", source.message()),
            _ => err.to_string(),
        };
        Self::Config { message, help }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Other { .. } => EXIT_FAILED,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": match err {
                CliError::Config { .. } => "config",
                CliError::Other { .. } => "other",
            },
            "message": err.to_string()
        }));

        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        // Use miette for human-friendly error display
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Fetch and unpack external repositories declared in a workspace file.
#[derive(Parser, Debug)]
#[command(name = "repofetch")]
#[command(about = "Fetch and unpack external repository archives declared in a workspace file")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace file declaring the rules
    #[arg(
        short = 'w',
        long,
        global = true,
        default_value = repofetch_core::WORKSPACE_FILE
    )]
    pub workspace: PathBuf,

    /// Directory holding `external/`; defaults to the user cache directory
    #[arg(long, global = true, env = repofetch_core::paths::OUTPUT_BASE_ENV)]
    pub output_base: Option<PathBuf>,

    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn", value_enum)]
    pub level: LogLevel,

    /// Diagnostic log format on stderr; JSON when `--json` is given, compact otherwise
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<TracingFormat>,

    /// Emit events and results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Fetch repositories (all declared rules by default) and print their directories
    Fetch {
        /// Rule names to fetch
        rules: Vec<String>,
        /// Extra attempts for transient failures within this run
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Print the directory a rule is materialized in
    Path {
        /// Rule name
        rule: String,
    },
    /// Remove repository directories, markers and staging directories
    Clean {
        /// Rule names to clean (all declared rules by default)
        rules: Vec<String>,
    },
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["repofetch", "fetch"]).unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert!(!cli.json);
        assert_eq!(cli.log_format, None);
        assert_eq!(cli.workspace, PathBuf::from("WORKSPACE.toml"));
        assert_eq!(
            cli.command,
            Commands::Fetch {
                rules: vec![],
                retries: 0
            }
        );
    }

    #[test]
    fn test_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "repofetch",
            "fetch",
            "png",
            "zlib",
            "--retries",
            "2",
            "--output-base",
            "/tmp/out",
            "--json",
            "--level",
            "debug",
            "--log-format",
            "dev",
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Commands::Fetch {
                rules: vec!["png".into(), "zlib".into()],
                retries: 2
            }
        );
        assert_eq!(cli.output_base, Some(PathBuf::from("/tmp/out")));
        assert!(cli.json);
        assert_eq!(cli.level, LogLevel::Debug);
        assert_eq!(cli.log_format, Some(TracingFormat::Dev));
    }

    #[test]
    fn test_path_requires_rule() {
        assert!(Cli::try_parse_from(["repofetch", "path"]).is_err());
        let cli = Cli::try_parse_from(["repofetch", "path", "png", "-w", "deps.toml"]).unwrap();
        assert_eq!(cli.command, Commands::Path { rule: "png".into() });
        assert_eq!(cli.workspace, PathBuf::from("deps.toml"));
    }

    #[test]
    fn test_invalid_level_rejected() {
        assert!(Cli::try_parse_from(["repofetch", "--level", "loud", "fetch"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::config("bad")), EXIT_CLI);
        assert_eq!(exit_code_for(&CliError::other("boom")), EXIT_FAILED);
    }

    #[test]
    fn test_workspace_error_keeps_help() {
        let err: CliError = WorkspaceError::DuplicateName { name: "png".into() }.into();
        assert!(matches!(err, CliError::Config { help: Some(_), .. }));
        assert!(err.to_string().contains("png"));
    }
}
