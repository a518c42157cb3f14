//! `providers` command.

use console::style;
use gpxtrack::config::ConfigFile;
use gpxtrack::provider::catalog;

use super::common::header;
use crate::error::CliError;

/// Lists the tile server catalog, marking the configured provider.
pub fn run(config: &ConfigFile) -> Result<(), CliError> {
    let selected = config.tiles.resolve_provider();

    header(&format!("Tile servers ({})", catalog::count()));
    println!(
        "{:<3} {:<16} {:<24} {:<7} {}",
        "#", "ID", "NAME", "ZOOM", "SOURCE"
    );
    for (index, provider) in catalog::all().enumerate() {
        let zoom = if provider.maximum_z < 0 {
            format!("{}+", provider.minimum_z)
        } else {
            format!("{}-{}", provider.minimum_z, provider.maximum_z)
        };
        let source = if provider.has_template() {
            provider.template_url
        } else {
            "(rendered on device)"
        };
        let line = format!(
            "{:<3} {:<16} {:<24} {:<7} {}",
            index, provider.id, provider.name, zoom, source
        );
        if provider.id == selected.id {
            println!("{}", style(line).green().bold());
        } else {
            println!("{}", line);
        }
    }
    Ok(())
}
