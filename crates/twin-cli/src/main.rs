//! Mirror Stage twin CLI
//!
//! A command-line tool for inspecting the digital twin, managing alerts
//! and pushing recorded samples to the twin server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, push, twin};
use std::path::PathBuf;

/// Mirror Stage twin CLI
#[derive(Parser)]
#[command(name = "twinctl")]
#[command(author, version, about = "CLI for the Mirror Stage digital twin", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via TWIN_API_URL env var)
    #[arg(long, env = "TWIN_API_URL")]
    pub api_url: Option<String>,

    /// Output format (defaults to the config file, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest snapshot: summary and host table
    State,

    /// Show one host in detail
    Host {
        /// Hostname as reported by the agent
        hostname: String,
    },

    /// Show hub-to-host links
    Links,

    /// List active alerts
    Alerts,

    /// Resolve an active alert
    Resolve {
        /// Alert ID
        id: String,
    },

    /// Push a JSON batch file of samples
    Push {
        /// File holding `{"samples": [...]}` or a bare array of samples
        file: PathBuf,
    },

    /// Show or update the CLI configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Store defaults in the configuration file
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default output format
        #[arg(long)]
        format: Option<output::OutputFormat>,
    },
}

fn configure(
    command: ConfigCommands,
    file_config: config::Config,
    api_url: &str,
    format: output::OutputFormat,
) -> Result<()> {
    let path = config::Config::config_path()?;

    match command {
        ConfigCommands::Show => {
            output::print_info(&format!("Config file: {}", path.display()));
            println!("api_url: {}", api_url);
            println!("format:  {}", format.name());
        }
        ConfigCommands::Set { api_url, format } => {
            let updated = config::Config {
                api_url: api_url.or(file_config.api_url),
                default_format: format
                    .map(|f| f.name().to_string())
                    .or(file_config.default_format),
            };
            updated.save_to(&path)?;
            output::print_success(&format!("Saved {}", path.display()));
        }
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let file_config = config::Config::load()?;
    let format = file_config.resolve_format(cli.format)?;
    let api_url = file_config.resolve_api_url(cli.api_url);

    // Built lazily: `config` must keep working with an invalid URL
    let client = || client::TwinClient::new(&api_url);

    // Execute command
    match cli.command {
        Commands::State => twin::show_state(&client()?, format).await?,
        Commands::Host { hostname } => twin::show_host(&client()?, &hostname, format).await?,
        Commands::Links => twin::show_links(&client()?, format).await?,
        Commands::Alerts => alerts::list_alerts(&client()?, format).await?,
        Commands::Resolve { id } => alerts::resolve_alert(&client()?, &id, format).await?,
        Commands::Push { file } => push::push_file(&client()?, &file, format).await?,
        Commands::Config(config_cmd) => configure(config_cmd, file_config, &api_url, format)?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        output::print_error(&err.to_string());
        if let Some(api_error) = err.downcast_ref::<client::ApiError>() {
            for detail in &api_error.details {
                eprintln!("  {}", detail);
            }
        } else {
            for cause in err.chain().skip(1) {
                eprintln!("  caused by: {}", cause);
            }
        }
        std::process::exit(1);
    }
}
