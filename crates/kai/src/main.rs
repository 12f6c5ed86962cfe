// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kai - chat-to-LLM routing backend.
//!
//! This is the binary entry point for the Kai assistant.

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kai_config::model::KaiConfig;

/// Kai - chat-to-LLM routing backend.
#[derive(Parser, Debug)]
#[command(name = "kai", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the XDG lookup.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway and agent.
    Serve,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Manage stored conversation threads.
    Threads {
        #[command(subcommand)]
        action: ThreadCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load and validate the configuration, then exit.
    Check,
}

#[derive(Subcommand, Debug)]
enum ThreadCommands {
    /// Delete expired threads now.
    Purge,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            kai_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Config {
            action: ConfigCommands::Check,
        } => {
            println!(
                "kai: config ok (agent.name={}, provider={}, database={})",
                config.agent.name, config.provider.kind, config.storage.database_path
            );
            Ok(())
        }
        Commands::Threads {
            action: ThreadCommands::Purge,
        } => match serve::purge_threads(&config).await {
            Ok(removed) => {
                println!("kai: purged {removed} expired thread(s)");
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<KaiConfig, Vec<kai_config::ConfigError>> {
    match path {
        Some(path) => kai_config::load_and_validate_path(path),
        None => kai_config::load_and_validate(),
    }
}
