//! QHub Command-Line Interface
//!
//! Drives the orchestrator against the in-process simulated execution
//! service: list targets, submit a circuit and follow it to completion.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use qhub_orchestrator::Config;
use qhub_orchestrator::tracing_config::{TracingConfig, init_tracing};

mod commands;

use commands::{circuits, run, targets};

/// QHub - quantum hardware job orchestration
#[derive(Parser)]
#[command(name = "qhub")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "QHUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List operational targets of the execution service
    Targets {
        /// API token
        #[arg(long, env = "QHUB_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// List the built-in library circuits
    Circuits,

    /// Submit a circuit and wait for its result
    Run {
        /// Library circuit name (see `qhub circuits`)
        #[arg(conflicts_with = "input", required_unless_present = "input")]
        circuit: Option<String>,

        /// Circuit file in JSON form
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Target identifier
        #[arg(short, long)]
        target: String,

        /// Number of shots (defaults to the configured value)
        #[arg(short, long)]
        shots: Option<u32>,

        /// Program mode (sampler, estimator)
        #[arg(short, long, default_value = "sampler")]
        mode: String,

        /// API token
        #[arg(long, env = "QHUB_TOKEN", hide_env_values = true)]
        token: String,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Print the final job record as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // The configured format applies; the level follows -v so a plain run
    // stays quiet.
    let mut tracing = TracingConfig::from(&config.logging);
    tracing.log_level = match cli.verbose {
        0 => "warn".to_string(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    if let Err(e) = init_tracing(&tracing) {
        eprintln!("{} {}", style("Warning:").yellow().bold(), e);
    }

    let result = match cli.command {
        Commands::Targets { token } => targets::execute(config, &token).await,

        Commands::Circuits => {
            circuits::execute();
            Ok(())
        }

        Commands::Run {
            circuit,
            input,
            target,
            shots,
            mode,
            token,
            timeout,
            json,
        } => {
            let source = match (circuit, input) {
                (_, Some(path)) => run::CircuitSource::File(path),
                (Some(name), None) => run::CircuitSource::Library(name),
                (None, None) => anyhow::bail!("Either a circuit name or --input is required"),
            };
            run::execute(
                config,
                run::RunArgs {
                    source,
                    target,
                    shots,
                    mode,
                    token,
                    timeout,
                    json,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
