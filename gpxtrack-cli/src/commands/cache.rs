//! Cache management CLI commands.

use clap::Subcommand;
use gpxtrack::cache::{disk_cache_stats, DiskTileStore};
use gpxtrack::config::{format_size, ConfigFile};

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Clear the tile cache, removing all cached tiles
    Clear,
    /// Show tile cache statistics
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config: &ConfigFile) -> Result<(), CliError> {
    let cache_dir = &config.tiles.cache_dir;

    match action {
        CacheAction::Clear => {
            println!("Clearing tile cache at: {}", cache_dir.display());

            let store = DiskTileStore::open(cache_dir, config.tiles.max_cache_bytes())?;
            let result = store.clear();
            println!(
                "Deleted {} tiles, freed {}",
                result.entries_removed,
                format_size(result.bytes_freed)
            );
            Ok(())
        }
        CacheAction::Stats => {
            println!("Tile cache: {}", cache_dir.display());

            let (tiles, bytes) = disk_cache_stats(cache_dir);
            println!("  Tiles:  {}", tiles);
            println!("  Size:   {}", format_size(bytes));
            println!("  Budget: {}", format_size(config.tiles.max_cache_bytes()));
            println!(
                "  Cache:  {}",
                if config.tiles.use_cache { "enabled" } else { "disabled" }
            );
            Ok(())
        }
    }
}
