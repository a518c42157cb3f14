//! Common helpers shared across CLI commands.

use std::sync::Arc;

use console::style;
use gpxtrack::cache::{TileCache, TileCacheConfig};
use gpxtrack::config::{ConfigFile, SharedPreferences};
use gpxtrack::provider::ReqwestClient;
use tokio::runtime::Runtime;
use tracing::debug;

use crate::error::CliError;

/// Loads the configuration file, falling back to defaults with a warning.
pub fn load_config() -> ConfigFile {
    match ConfigFile::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{} {} (using defaults)",
                style("⚠").yellow().bold(),
                e
            );
            ConfigFile::default()
        }
    }
}

/// Multi-threaded runtime for commands that touch the network.
pub fn runtime() -> Result<Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Tile cache configured from the file, with the network client.
pub fn open_tile_cache(config: &ConfigFile) -> Result<TileCache, CliError> {
    let cache_config = TileCacheConfig::from_config(config);
    let client = ReqwestClient::with_timeout(cache_config.fetch_timeout)?;
    let prefs = SharedPreferences::from_config(config);
    debug!(
        directory = %cache_config.directory.display(),
        provider = prefs.current().provider.id,
        "Opening tile cache"
    );
    Ok(TileCache::open(cache_config, Arc::new(client), Arc::new(prefs))?)
}

/// Prints a section header.
pub fn header(title: &str) {
    println!("{}", style(title).bold());
    println!("{}", "=".repeat(title.chars().count()));
}
