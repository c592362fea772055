// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Switchboard - sync core of the agent support console.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod run;
mod session;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use switchboard_core::AgentStatus;

/// Switchboard - sync core of the agent support console.
#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about, long_about = None)]
struct Cli {
    /// Read settings from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the sync core and log queue changes until interrupted.
    Run,
    /// Print the effective configuration.
    Config,
    /// Sign in and store the session.
    Login {
        /// Agent email address.
        #[arg(long)]
        email: String,
    },
    /// Sign out and clear the stored session.
    Logout,
    /// Change the agent's availability (online, busy, away, offline).
    Status { status: AgentStatus },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => switchboard_config::load_and_validate_path(path),
        None => switchboard_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            switchboard_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Run) => run::run_console(config).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => print!("{rendered}"),
                Err(e) => {
                    eprintln!("error: failed to render configuration: {e}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Some(Commands::Login { email }) => session::login(&config, &email).await,
        Some(Commands::Logout) => session::logout(&config).await,
        Some(Commands::Status { status }) => session::set_status(&config, status).await,
        None => {
            println!("switchboard: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
