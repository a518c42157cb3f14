//! `recover status|export|discard` commands over the crash-recovery journal.

use std::fs;
use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use gpxtrack::config::{default_data_dir, ConfigFile};
use gpxtrack::gpx;
use gpxtrack::recovery::{JournalRecoveryStore, RecoveredSession, RecoveryStore};

use crate::commands::gpx::summarize;
use crate::error::CliError;

/// Recovery subcommands.
#[derive(Debug, Subcommand)]
pub enum RecoverCommands {
    /// Show whether an unfinished session is waiting to be recovered
    Status,

    /// Write the unfinished session to a GPX file
    Export {
        /// Output path
        file: PathBuf,
    },

    /// Delete the recovery journal
    Discard,
}

/// Run a recover subcommand.
pub fn run(command: RecoverCommands, config: &ConfigFile) -> Result<(), CliError> {
    let mut store = JournalRecoveryStore::open(default_data_dir());

    match command {
        RecoverCommands::Status => {
            println!("Journal: {}", store.path().display());
            match store.load_pending() {
                Some(pending) => {
                    println!("{} Unfinished session found", style("!").yellow());
                    if let Some(name) = &pending.filename {
                        println!("  Last saved as: {}", name);
                    }
                    for line in summarize(&pending.snapshot, config.tracking.units) {
                        println!("  {}", line);
                    }
                }
                None => println!("{} Nothing to recover", style("✓").green()),
            }
            Ok(())
        }
        RecoverCommands::Export { file } => {
            let pending = take_pending(&mut store)?;
            fs::write(&file, gpx::encode(&pending.snapshot)).map_err(|e| CliError::io(&file, e))?;
            println!(
                "{} Wrote {} points and {} waypoints to {}",
                style("✓").green(),
                pending.snapshot.point_count(),
                pending.snapshot.waypoints.len(),
                file.display()
            );
            Ok(())
        }
        RecoverCommands::Discard => {
            store.clear()?;
            println!("{} Recovery journal removed", style("✓").green());
            Ok(())
        }
    }
}

fn take_pending(store: &mut dyn RecoveryStore) -> Result<RecoveredSession, CliError> {
    store.load_pending().ok_or(CliError::NothingToRecover)
}
