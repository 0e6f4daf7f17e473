//! odf-deploy CLI library

pub mod commands;
pub mod config;
pub mod deployment;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::deploy::{self, DeployArgs};
use commands::CommandErrorExt;
use config::{MultiClusterConfig, CONFIG_ENV};

/// odf-deploy - Multi-cluster OpenShift and storage operator deployment
#[derive(Parser, Debug)]
#[command(name = "odf-deploy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the multi-cluster configuration file
    #[arg(
        short = 'c',
        long = "config",
        env = CONFIG_ENV,
        global = true,
        default_value = "odf-deploy.yaml"
    )]
    pub config: PathBuf,

    /// Log level (overrides run.log_level; RUST_LOG overrides both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install OpenShift on every cluster that is not skipped or already running
    DeployOcp(DeployArgs),
    /// Install the storage operator on each cluster
    InstallOcs(DeployArgs),
    /// Install OpenShift, then the storage operator
    Deploy(DeployArgs),
}

/// Map a log level name onto a tracing filter directive
pub fn filter_directive(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

/// Initialize tracing, preferring `RUST_LOG` over `level`
pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .cmd_err()
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = MultiClusterConfig::load(&self.config)?;
        let log_level = self
            .log_level
            .clone()
            .unwrap_or_else(|| config.run.log_level.clone());
        init_logging(&log_level)?;

        match self.command {
            Commands::DeployOcp(args) => deploy::deploy_ocp(&config, &args, &log_level).await,
            Commands::InstallOcs(args) => deploy::install_ocs(&config, &args).await,
            Commands::Deploy(args) => deploy::deploy(&config, &args, &log_level).await,
        }
    }
}
