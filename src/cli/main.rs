//! blueprint-cli - run the normalizer, schema extractor and transforms on local files

mod commands;
mod error;
mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use blueprint_engine::EngineConfig;
use clap::{Parser, Subcommand};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "blueprint-cli", version, about = "Normalize, infer and map data files")]
struct Cli {
    /// TOML configuration file; environment overrides still apply
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a csv, xml, sql or json file into a JSON record array
    Normalize {
        input: PathBuf,
        /// Declared content type; derived from the extension when omitted
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Infer a JSON Schema with example values
    Infer {
        input: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Map a JSON document through a field mapping
    Apply {
        input: PathBuf,
        /// JSON object of output field to expression
        #[arg(long)]
        mapping: PathBuf,
        /// JSON Schema every record must satisfy
        #[arg(long)]
        schema: Option<PathBuf>,
    },
}

fn setup_logging(level: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .with_context(|| format!("Unknown log level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

async fn run(cli: Cli) -> Result<()> {
    setup_logging(&cli.log_level)?;
    let config = load_config(cli.config.as_deref())?;
    debug!(?config, "Configuration loaded");
    let output = cli.output.as_deref();

    match &cli.command {
        Command::Normalize {
            input,
            content_type,
        } => {
            commands::handle_normalize(&config, input, content_type.as_deref(), cli.pretty, output)
                .await?
        }
        Command::Infer {
            input,
            content_type,
        } => {
            commands::handle_infer(&config, input, content_type.as_deref(), cli.pretty, output)
                .await?
        }
        Command::Apply {
            input,
            mapping,
            schema,
        } => commands::handle_apply(input, mapping, schema.as_deref(), cli.pretty, output)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
