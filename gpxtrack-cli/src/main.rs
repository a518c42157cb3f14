//! gpxtrack CLI - Command-line interface
//!
//! Exercises the gpxtrack library from a terminal: tile catalog and cache,
//! GPX inspection, crash recovery and configuration.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use console::style;
use gpxtrack::logging::{init_logging, LoggingConfig};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::files::FilesCommands;
use commands::gpx::GpxCommands;
use commands::recover::RecoverCommands;
use commands::tile::TileCommands;
use error::CliError;

/// GPS track recorder: tiles, GPX files and crash recovery
#[derive(Debug, Parser)]
#[command(name = "gpxtrack", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the available tile servers
    Providers,

    /// Fetch a tile or find the tile covering a position
    Tile {
        #[command(subcommand)]
        command: TileCommands,
    },

    /// Inspect or clear the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect GPX files
    Gpx {
        #[command(subcommand)]
        command: GpxCommands,
    },

    /// Inspect, export or discard an unfinished session
    Recover {
        #[command(subcommand)]
        command: RecoverCommands,
    },

    /// View and modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage saved GPX files
    Files {
        #[command(subcommand)]
        command: FilesCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = commands::common::load_config();

    let mut logging = LoggingConfig::from(&config.logging);
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    let _log_guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {}", style("⚠").yellow().bold(), e);
            None
        }
    };

    tracing::debug!(command = ?cli.command, "Running command");

    let result = match cli.command {
        Commands::Providers => commands::providers::run(&config),
        Commands::Tile { command } => commands::tile::run(command, &config),
        Commands::Cache { action } => commands::cache::run(action, &config),
        Commands::Gpx { command } => commands::gpx::run(command, &config),
        Commands::Recover { command } => commands::recover::run(command, &config),
        Commands::Config { command } => commands::config::run(command),
        Commands::Files { command } => commands::files::run(command, &config),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(e.exit_code());
    }
}

fn report(error: &CliError) {
    eprintln!("{} {}", style("✗").red().bold(), style(error).red().bold());
}
