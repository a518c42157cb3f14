//! `files list|remove` commands for saved GPX files.

use chrono::Local;
use clap::Subcommand;
use console::style;
use gpxtrack::config::ConfigFile;
use gpxtrack::files::{GpxFileInfo, GpxFileStore};

use crate::error::CliError;

/// Saved-file subcommands.
#[derive(Debug, Subcommand)]
pub enum FilesCommands {
    /// List saved GPX files, newest first
    List,

    /// Delete a saved GPX file
    Remove {
        /// File name, with or without the .gpx extension
        name: String,
    },
}

/// Run a files subcommand.
pub fn run(command: FilesCommands, config: &ConfigFile) -> Result<(), CliError> {
    let store = GpxFileStore::new(&config.files.directory);

    match command {
        FilesCommands::List => {
            let files = store.list()?;
            if files.is_empty() {
                println!("No GPX files in {}", store.directory().display());
                return Ok(());
            }
            println!("{}", store.directory().display());
            for file in &files {
                println!("  {}", list_line(file));
            }
            Ok(())
        }
        FilesCommands::Remove { name } => {
            let path = store.path_for(&name)?;
            store.remove(&name)?;
            println!("{} Removed {}", style("✓").green(), path.display());
            Ok(())
        }
    }
}

fn list_line(file: &GpxFileInfo) -> String {
    format!(
        "{:<32} {:>10}  {}",
        file.name,
        file.size_text,
        file.modified.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    )
}
