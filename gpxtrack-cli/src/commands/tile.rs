//! `tile fetch` and `tile locate` commands.

use std::path::PathBuf;

use clap::Subcommand;
use gpxtrack::cache::{TileFetch, TileKey};
use gpxtrack::config::{resolve_provider, ConfigFile};
use gpxtrack::coord::to_tile_coords;
use gpxtrack::provider::{catalog, TileServerDescriptor};

use super::common::{open_tile_cache, runtime};
use crate::error::CliError;

/// Tile subcommands.
#[derive(Debug, Subcommand)]
pub enum TileCommands {
    /// Fetch one tile through the cache
    Fetch {
        /// Provider id or catalog index (defaults to the configured provider)
        #[arg(long)]
        provider: Option<String>,

        /// Zoom level
        #[arg(long)]
        zoom: u8,

        /// Tile column
        #[arg(long)]
        x: u32,

        /// Tile row
        #[arg(long)]
        y: u32,

        /// Write the tile image to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the tile covering a position
    Locate {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Zoom level
        #[arg(long)]
        zoom: u8,

        /// Provider id or catalog index (defaults to the configured provider)
        #[arg(long)]
        provider: Option<String>,
    },
}

/// Run a tile subcommand.
pub fn run(command: TileCommands, config: &ConfigFile) -> Result<(), CliError> {
    match command {
        TileCommands::Fetch {
            provider,
            zoom,
            x,
            y,
            out,
        } => {
            let provider = select_provider(provider.as_deref(), config)?;
            run_fetch(config, provider, zoom, x, y, out)
        }
        TileCommands::Locate {
            lat,
            lon,
            zoom,
            provider,
        } => {
            let provider = select_provider(provider.as_deref(), config)?;
            run_locate(provider, lat, lon, zoom)
        }
    }
}

/// Explicit provider must exist; the configured one falls back to the default.
fn select_provider(
    requested: Option<&str>,
    config: &ConfigFile,
) -> Result<&'static TileServerDescriptor, CliError> {
    match requested {
        Some(value) => match value.parse::<usize>() {
            Ok(index) => catalog::by_index(index),
            Err(_) => catalog::lookup(value),
        }
        .map_err(|e| CliError::Config(format!("{}. Use 'gpxtrack providers' to list them.", e))),
        None => Ok(resolve_provider(&config.tiles.provider)),
    }
}

fn run_fetch(
    config: &ConfigFile,
    provider: &'static TileServerDescriptor,
    zoom: u8,
    x: u32,
    y: u32,
    out: Option<PathBuf>,
) -> Result<(), CliError> {
    let runtime = runtime()?;
    let cache = open_tile_cache(config)?;
    let key = TileKey::new(provider, zoom, x, y);

    let (bytes, from_cache) = runtime.block_on(async {
        match cache.fetch(provider, zoom, x, y)? {
            TileFetch::Ready(bytes) => Ok::<_, CliError>((bytes, true)),
            TileFetch::Pending(pending) => Ok((pending.wait().await?, false)),
        }
    })?;

    println!(
        "{} {} bytes ({})",
        key,
        bytes.len(),
        if from_cache { "cache" } else { "network" }
    );
    if cache.store().contains(&key) {
        println!("Cached at {}", cache.store().path_for(&key).display());
    }
    if let Some(path) = out {
        std::fs::write(&path, &bytes).map_err(|e| CliError::io(&path, e))?;
        println!("Written to {}", path.display());
    }
    Ok(())
}

fn run_locate(
    provider: &'static TileServerDescriptor,
    lat: f64,
    lon: f64,
    zoom: u8,
) -> Result<(), CliError> {
    let tile = to_tile_coords(lat, lon, zoom)?;

    println!("zoom {} x {} y {}", tile.zoom, tile.x, tile.y);
    if !provider.supports_zoom(zoom) {
        println!("{} does not serve zoom {}", provider, zoom);
    } else if let Some(url) = provider.tile_url(zoom, tile.x, tile.y) {
        println!("{}", url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_provider_by_id_and_index() {
        let config = ConfigFile::default();
        assert_eq!(
            select_provider(Some("openstreetmap"), &config).unwrap().id,
            "openStreetMap"
        );
        assert_eq!(select_provider(Some("2"), &config).unwrap().id, "openStreetMap");
        assert!(matches!(
            select_provider(Some("nope"), &config),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            select_provider(Some("99"), &config),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_configured_provider_falls_back() {
        let mut config = ConfigFile::default();
        config.tiles.provider = "42".to_string();
        assert_eq!(
            select_provider(None, &config).unwrap().id,
            catalog::default_provider().id
        );
    }
}
