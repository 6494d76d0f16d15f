//! # Command Line Interface
//!
//! `stack-bootstrap <command>` runs one or all provisioning pipelines, or
//! validates the configuration they would use.

pub mod output;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use crate::bootstrap::Bootstrapper;
use crate::config::{BootstrapConfig, LogFormat, LoggingConfig, Stage};
use crate::observability::init_logging;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "stack-bootstrap")]
#[command(about = "Idempotent bootstrap of the database, identity provider and secrets store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log format: text or json (falls back to BOOTSTRAP_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Summary output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every pipeline: database, identity, secrets
    All,

    /// Ensure the application role, database and schemas
    Database,

    /// Ensure the realm, client, admin group, roles and admin user
    Identity,

    /// Initialize and unseal Vault, then ensure engine, policy, auth method and user
    Secrets,

    /// Validate configuration without contacting any system
    CheckConfig {
        /// Stages to validate (defaults to all)
        #[arg(long, value_enum, value_delimiter = ',')]
        stages: Vec<StageArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Database,
    Identity,
    Secrets,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Database => Stage::Database,
            StageArg::Identity => Stage::Identity,
            StageArg::Secrets => Stage::Secrets,
        }
    }
}

impl Commands {
    /// Stages the command touches, in execution order
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            Commands::All => Stage::ALL.to_vec(),
            Commands::Database => vec![Stage::Database],
            Commands::Identity => vec![Stage::Identity],
            Commands::Secrets => vec![Stage::Secrets],
            Commands::CheckConfig { stages } if stages.is_empty() => Stage::ALL.to_vec(),
            Commands::CheckConfig { stages } => {
                let selected: Vec<Stage> = stages.iter().copied().map(Stage::from).collect();
                Stage::ALL.into_iter().filter(|s| selected.contains(s)).collect()
            }
        }
    }
}

fn logging_config(cli: &Cli) -> anyhow::Result<LoggingConfig> {
    let format = match cli.log_format.clone().or_else(|| std::env::var("BOOTSTRAP_LOG_FORMAT").ok()) {
        Some(raw) => raw.parse::<LogFormat>().map_err(anyhow::Error::msg)?,
        None => LogFormat::Text,
    };
    let level = if cli.verbose { "debug" } else { "info" };
    Ok(LoggingConfig { level: level.to_string(), format })
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&logging_config(&cli)?)?;

    let stages = cli.command.stages();
    let config = BootstrapConfig::from_env(&stages).context("Failed to load configuration")?;

    if let Commands::CheckConfig { .. } = cli.command {
        tracing::info!(stages = ?stages, "Configuration is valid");
        return output::print_config(&config, cli.output);
    }

    let summary = Bootstrapper::new(&config).run(&stages).await;
    output::print_summary(&summary, cli.output)?;

    if let Some((stage, error)) = summary.fatal {
        return Err(anyhow::Error::new(error).context(format!("{} pipeline aborted", stage)));
    }

    let failed = summary.failed_resources();
    if failed > 0 {
        anyhow::bail!("Bootstrap finished with {} failed resource(s)", failed);
    }

    Ok(())
}
