// SPDX-FileCopyrightText: 2026 Telesave Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telesave - archive every Telegram chat into a local store.
//!
//! This is the binary entry point: CLI parsing, configuration loading and
//! the process exit code.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod doctor;
mod log;
mod scan;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use telesave_sync::RunFlags;

/// Telesave - archive every Telegram chat into a local store.
#[derive(Parser, Debug)]
#[command(name = "telesave", version, about, long_about = None)]
struct Cli {
    /// Replay the full history of every chat from the start.
    #[arg(long)]
    all: bool,

    /// Archive self-destructing messages without forwarding them.
    #[arg(long = "dontsaveselfdestructing")]
    dont_save_self_destructing: bool,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,

    /// Exit after backfill instead of staying live.
    #[arg(long)]
    once: bool,

    /// Print the final sync report as JSON.
    #[arg(long)]
    json: bool,

    /// Explicit configuration file, replacing the default search paths.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands. Without one, telesave syncs.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the most recently archived messages.
    Log {
        /// Number of messages to print.
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// List blob files that no archived message references.
    Scan,
    /// Check the archive, blob store and Telegram connection.
    Doctor,
}

impl Cli {
    fn run_flags(&self) -> RunFlags {
        RunFlags {
            all: self.all,
            dont_save_self_destructing: self.dont_save_self_destructing,
            once: self.once,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match telesave_config::load_and_validate(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            telesave_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };

    sync::init_tracing(&config.log.level, cli.debug);

    let result = match cli.command {
        Some(Commands::Log { count }) => log::run_log(&config, count).await,
        Some(Commands::Scan) => scan::run_scan(&config).await,
        Some(Commands::Doctor) => doctor::run_doctor(&config).await,
        None => {
            if let Err(e) = telesave_config::require_credentials(&config) {
                telesave_config::render_errors(&[e]);
                return ExitCode::FAILURE;
            }
            sync::run_sync(&config, cli.run_flags(), cli.json).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
