//! `config get|set|list|path` commands.
//!
//! Keys are written `section.key`, e.g. `tiles.provider` or `files.date_format`.

use clap::Subcommand;
use console::style;
use gpxtrack::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting in format section.key (e.g., tiles.provider)
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Setting in format section.key (e.g., tracking.units)
        key: String,

        /// New value
        value: String,
    },

    /// List every setting, marking those that differ from the default
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::load()?;
            println!("{}", display_value(&key.get(&config)));
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = ConfigFile::load()?;
            key.set(&mut config, &value)
                .map_err(|e| CliError::Config(e.to_string()))?;
            config.save()?;
            // provider values are canonicalised, show what was stored
            println!("Set {} = {}", key.name(), key.get(&config));
            Ok(())
        }
        ConfigCommands::List => {
            let config = ConfigFile::load()?;
            for line in list_lines(&config) {
                println!("{}", line);
            }
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'gpxtrack config list' to see available keys.",
            key
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// `[section]` blocks of `key = value`, with `*` on changed settings.
fn list_lines(config: &ConfigFile) -> Vec<String> {
    let defaults = ConfigFile::default();
    let mut lines = Vec::new();
    let mut section = "";

    for key in ConfigKey::all() {
        if key.section() != section {
            if !section.is_empty() {
                lines.push(String::new());
            }
            section = key.section();
            lines.push(style(format!("[{}]", section)).bold().to_string());
        }
        let value = key.get(config);
        let marker = if value != key.get(&defaults) { " *" } else { "" };
        lines.push(format!(
            "  {} = {}{}",
            key.key_name(),
            display_value(&value),
            marker
        ));
    }
    lines
}
