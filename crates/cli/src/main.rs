use clap::{Parser, Subcommand};

mod commands;
use commands::{handle_config_command, list_endpoints, probe_endpoints, ConfigCommands};

#[derive(Parser)]
#[command(name = "marketgate-cli")]
#[command(about = "Marketgate CLI: RPC candidates, endpoint probing and configuration checks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// List RPC candidates in priority order (credentials masked)
    Endpoints {
        /// Path to config file
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Probe every candidate, then run one selection pass
    Probe {
        /// Path to config file
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config(config_command) => handle_config_command(config_command)?,
        Commands::Endpoints { file } => list_endpoints(&file)?,
        Commands::Probe { file } => probe_endpoints(&file).await?,
    }

    Ok(())
}
