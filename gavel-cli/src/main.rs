//! Main entry point for the Gavel command-line client.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::Config;

mod commands;

use commands::{
    bids::BidsArgs,
    chat::ChatArgs,
    notifications::NotificationsArgs,
    session::{LoginArgs, LogoutArgs, StatusArgs},
};

/// Gavel CLI
#[derive(Parser)]
#[command(name = "gavel")]
#[command(about = "Command-line client for the Gavel auction platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the Gavel CLI
#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login(LoginArgs),

    /// Sign out and remove the stored session
    Logout(LogoutArgs),

    /// Show the stored session
    Status(StatusArgs),

    /// Print a transaction's chat and follow new messages
    Chat(ChatArgs),

    /// Print a product's leaderboard and follow new bids
    Bids(BidsArgs),

    /// Follow your notifications
    Notifications(NotificationsArgs),

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)
        #[arg(long, short)]
        shell: clap_complete::Shell,
    },

    /// Generate a configuration file with the default settings
    Config {
        /// Format of the configuration file to generate (yaml, json or toml). Defaults to yaml.
        #[arg(long, short, default_value = "yaml")]
        format: String,
    },
}

/// Loads configuration and installs the tracing subscriber.
pub(crate) fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = Config::load_config(path).context("failed to load configuration")?;
    client::tracer::init_tracing(&config.logging);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Login(args) => commands::session::login(args).await?,
        Commands::Logout(args) => commands::session::logout(args).await?,
        Commands::Status(args) => commands::session::status(&args)?,
        Commands::Chat(args) => commands::chat::handle_chat(args).await?,
        Commands::Bids(args) => commands::bids::handle_bids(args).await?,
        Commands::Notifications(args) => commands::notifications::handle_notifications(args).await?,
        Commands::Completion { shell } => commands::completion::generate_completion(shell),
        Commands::Config { format } => commands::config::generate_config(&format)?,
    }

    Ok(())
}
