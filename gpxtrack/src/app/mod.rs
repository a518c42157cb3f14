//! Application wiring and lifecycle.
//!
//! [`TrackerApp`] owns the live preferences, the tile cache, the recording
//! session and the stopwatch, and is what a front end talks to.
//!
//! # Startup
//!
//! ```text
//! TrackerApp::start
//!   1. TileCache::open            (scans the disk cache)
//!   2. RecoveryStore::load_pending (exactly once)
//!   3. TrackSession::new           (empty, NotStarted)
//! ```
//!
//! A session found in the recovery journal is held until the front end
//! collects it with [`TrackerApp::take_recovered`] and decides between
//! [`TrackerApp::resume_recovered`] and [`TrackerApp::discard_recovered`].
//! Starting a new recording before deciding discards it.
//!
//! # Example
//!
//! ```ignore
//! use gpxtrack::app::{AppConfig, TrackerApp};
//! use gpxtrack::config::{ConfigFile, SharedPreferences};
//!
//! let config = ConfigFile::load()?;
//! let app = TrackerApp::start(
//!     AppConfig::from_config_file(&config),
//!     SharedPreferences::from_config(&config),
//! )?;
//!
//! if app.take_recovered().is_some() {
//!     app.resume_recovered()?;
//! }
//! app.start_tracking()?;
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::TrackerApp;
pub use config::{AppConfig, FILES_DIR_NAME, TILES_DIR_NAME};
pub use error::AppError;
