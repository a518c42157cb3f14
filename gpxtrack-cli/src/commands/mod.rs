//! CLI command implementations.

pub mod cache;
pub mod common;
pub mod config;
pub mod files;
pub mod gpx;
pub mod providers;
pub mod recover;
pub mod tile;
