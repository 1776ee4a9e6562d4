//! repofetch CLI application.

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use repofetch::cli::{self, CliError, Cli, Commands, EXIT_OK, exit_code_for, render_error};
use repofetch::commands::fetch::FetchOptions;
use repofetch::commands::{self, CommandContext};
use repofetch::shutdown;
use repofetch::tracing::{Level, TracingConfig, TracingFormat, init_tracing};

/// Exit code for SIGINT (128 + signal number 2)
const EXIT_SIGINT: i32 = 130;

fn main() {
    // Tracing may not be usable while panicking; write directly.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let exit_code = run_with_tokio(cli);
    std::process::exit(exit_code);
}

/// Create tokio runtime and run the command
fn run_with_tokio(cli: Cli) -> i32 {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            return 1;
        }
    };

    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> i32 {
    let level = Level::from(cli.level);
    let config = TracingConfig {
        format: cli.log_format.unwrap_or(if cli.json {
            TracingFormat::Json
        } else {
            TracingFormat::Compact
        }),
        level,
        ..TracingConfig::default()
    };
    if let Err(e) = init_tracing(config) {
        eprintln!("Warning: {e}");
    }

    let json = cli.json;
    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            render_error(&err, json);
            exit_code_for(&err)
        }
    }
}

async fn execute(cli: Cli) -> Result<i32, CliError> {
    let ctx = CommandContext::load(&cli.workspace, cli.output_base.as_deref(), cli.json)?;

    match cli.command {
        Commands::Fetch { rules, retries } => {
            let coordinator = shutdown::install_signal_handlers();
            let options = FetchOptions {
                rules,
                retries,
                verbose: Level::from(cli.level) >= Level::INFO,
            };
            let code = commands::fetch::execute(&ctx, &options, coordinator.token()).await?;
            if coordinator.is_shutdown() {
                return Ok(EXIT_SIGINT);
            }
            Ok(code)
        }
        Commands::Path { rule } => {
            let path = commands::path::execute(&ctx, &rule).await?;
            println!("{}", commands::path::render(&path, ctx.json())?);
            Ok(EXIT_OK)
        }
        Commands::Clean { rules } => {
            let cleaned = commands::clean::execute(&ctx, &rules).await?;
            let output = commands::clean::render(&cleaned, ctx.json())?;
            if !output.is_empty() {
                println!("{output}");
            }
            Ok(EXIT_OK)
        }
    }
}
