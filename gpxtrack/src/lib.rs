//! gpxtrack - GPS track recording core
//!
//! This library records GPS tracks and waypoints, keeps them recoverable
//! across crashes, reads and writes GPX, and serves map tiles from a
//! size-bounded disk cache.
//!
//! # Modules
//!
//! - [`session`]: the recording state machine and its data model
//! - [`recovery`]: the append-only journal that mirrors the active session
//! - [`gpx`]: GPX 1.1 encoding and decoding
//! - [`cache`]: coalescing, size-bounded tile cache
//! - [`provider`]: tile server catalog and HTTP client
//! - [`app`]: [`TrackerApp`](app::TrackerApp), which wires the above together
//! - [`config`]: INI configuration and live preferences

pub mod app;
pub mod cache;
pub mod config;
pub mod coord;
pub mod filename;
pub mod files;
pub mod gpx;
pub mod logging;
pub mod provider;
pub mod recovery;
pub mod session;
pub mod stopwatch;
pub mod units;
