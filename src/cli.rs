use crate::config::Config;
use crate::engine::{self, Engine};
use crate::executor::types::Program;
use crate::gateway::{DeterministicSource, IoContract};
use crate::host;
use crate::types::ExecutionResult;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "sketchvm")]
#[command(about = "SketchVM - run Arduino sketch trees and print the command log", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a parsed sketch against the deterministic data source
    Run {
        /// Program tree as JSON
        program: PathBuf,

        /// I/O contract: blocking or suspend-resume
        #[arg(long)]
        contract: Option<IoContract>,

        /// How many times loop() runs
        #[arg(long)]
        max_loop_iterations: Option<u32>,

        /// Suspend-resume only: response deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Capability catalog (TOML, or JSON by extension)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Print the effective capability catalog
    Catalog {
        #[arg(long, value_enum, default_value = "toml")]
        format: CatalogFormat,

        /// Capability catalog to print instead of the configured one
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CatalogFormat {
    Json,
    Toml,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::try_parse_from(args)?;
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            program,
            contract,
            max_loop_iterations,
            timeout_ms,
            catalog,
        } => {
            let config = Config::builder()
                .config_path(cli.config)
                .io_contract(contract)
                .max_loop_iterations(max_loop_iterations)
                .response_timeout_ms(timeout_ms)
                .catalog_path(catalog)
                .build()?;

            let program = read_program(&program)?;
            let result = execute(&program, config).await?;
            print!("{}", result.to_json_lines()?);

            if !result.is_success() {
                let message = result
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "run did not finish".to_string());
                anyhow::bail!("sketch failed: {message}");
            }
        }

        Commands::Catalog { format, catalog } => {
            let config = Config::builder()
                .config_path(cli.config)
                .catalog_path(catalog)
                .build()?;
            let catalog = config.load_catalog()?;
            let rendered = match format {
                CatalogFormat::Json => serde_json::to_string_pretty(&catalog)?,
                CatalogFormat::Toml => {
                    toml::to_string_pretty(&catalog).context("Failed to render catalog as TOML")?
                }
            };
            println!("{rendered}");
        }
    }

    Ok(())
}

fn read_program(path: &Path) -> Result<Program> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read program {}", path.display()))?;
    serde_json::from_str(&source)
        .with_context(|| format!("Failed to parse program tree {}", path.display()))
}

async fn execute(program: &Program, config: Config) -> Result<ExecutionResult> {
    info!(contract = ?config.io_contract, iterations = config.max_loop_iterations, "running sketch");
    let catalog = Arc::new(config.load_catalog()?);
    match config.io_contract {
        IoContract::Blocking => Ok(engine::run(
            program,
            config,
            catalog,
            DeterministicSource::new(),
        )?),
        IoContract::SuspendResume => {
            let engine = Engine::new(program, config, catalog)?;
            Ok(host::run_with_source(engine, DeterministicSource::new()).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "sketchvm",
            "run",
            "blink.json",
            "--contract",
            "suspend-resume",
            "--max-loop-iterations",
            "5",
            "--timeout-ms",
            "100",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                program,
                contract,
                max_loop_iterations,
                timeout_ms,
                catalog,
            } => {
                assert_eq!(program, PathBuf::from("blink.json"));
                assert_eq!(contract, Some(IoContract::SuspendResume));
                assert_eq!(max_loop_iterations, Some(5));
                assert_eq!(timeout_ms, Some(100));
                assert!(catalog.is_none());
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_unknown_contract_rejected() {
        let parsed = Cli::try_parse_from(["sketchvm", "run", "x.json", "--contract", "eventually"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_catalog_format_defaults_to_toml() {
        let cli = Cli::try_parse_from(["sketchvm", "catalog"]).unwrap();
        match cli.command {
            Commands::Catalog { format, .. } => assert_eq!(format, CatalogFormat::Toml),
            _ => panic!("Expected catalog command"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_file_is_an_error() {
        let err = run_cli_from_args(vec![
            "sketchvm".into(),
            "run".into(),
            "/nonexistent/sketch.json".into(),
        ])
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read program"));
    }
}
