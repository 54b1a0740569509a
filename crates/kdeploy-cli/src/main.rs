//! kdeploy - idempotent workload rollouts
//!
//! - Deploy a package to a configured environment
//! - Render the manifest a deploy would submit
//! - Show the resolved configuration

use clap::{Parser, Subcommand};
use kdeploy_core::DeployConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::{deploy, render};
use output::OutputFormat;

/// kdeploy CLI
#[derive(Parser)]
#[command(name = "kdeploy")]
#[command(about = "Create-or-replace rollouts onto managed Kubernetes clusters", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KDEPLOY_CONFIG", default_value = "kdeploy.yaml", global = true)]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Deploy the package to an environment
    Deploy {
        /// Environment name from the configuration
        environment: String,
    },

    /// Print the manifest a deploy would submit
    Render {
        /// Environment name from the configuration
        environment: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },

    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    // Logs go to stderr so rendered documents stay clean on stdout
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = DeployConfig::load(&cli.config).map_err(|e| {
        anyhow::anyhow!("Failed to load {}: {}", cli.config.display(), e)
    })?;

    match cli.command {
        Commands::Deploy { environment } => deploy::execute(&config, &environment).await,
        Commands::Render {
            environment,
            output,
        } => render::execute(&config, &environment, output),
        Commands::Config => {
            println!("Config file: {}", cli.config.display());
            output::print_document(&config, OutputFormat::Yaml)
        }
    }
}
