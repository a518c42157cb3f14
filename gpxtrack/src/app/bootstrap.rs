//! `TrackerApp`: startup sequencing and the single-writer session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::config::AppConfig;
use super::error::AppError;
use crate::cache::{TileCache, TileError};
use crate::config::SharedPreferences;
use crate::coord::Coordinate;
use crate::files::GpxFileStore;
use crate::filename::default_filename;
use crate::gpx;
use crate::provider::{AsyncHttpClient, ReqwestClient};
use crate::recovery::{JournalRecoveryStore, RecoveredSession, RecoveryStore};
use crate::session::{
    Heading, LocationFix, SessionMetrics, SessionSnapshot, TrackSession, TrackingStatus,
    WaypointId,
};
use crate::stopwatch::StopWatch;

/// A recovered session waiting for the front end's decision.
struct PendingRecovery {
    session: RecoveredSession,
    announced: bool,
}

/// The tracker core, wired.
///
/// All session mutations go through one mutex, so fixes, button presses and
/// waypoint edits are applied in a single order. The stopwatch follows the
/// tracking status: tracking starts it, pausing stops it, reset zeroes it.
pub struct TrackerApp {
    config: AppConfig,
    preferences: SharedPreferences,
    tile_cache: TileCache,
    session: Mutex<TrackSession>,
    stopwatch: StopWatch,
    ticks: Mutex<Option<mpsc::Receiver<String>>>,
    files: GpxFileStore,
    recovered: Mutex<Option<PendingRecovery>>,
}

impl TrackerApp {
    /// Starts with the network tile client and the on-disk recovery journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the tile cache cannot be
    /// created.
    pub fn start(config: AppConfig, preferences: SharedPreferences) -> Result<Self, AppError> {
        let client = ReqwestClient::with_timeout(config.tile_cache.fetch_timeout)?;
        let recovery = JournalRecoveryStore::open(&config.data_dir);
        Self::start_with(config, preferences, Arc::new(client), Box::new(recovery))
    }

    /// Starts with explicit collaborators.
    pub fn start_with(
        config: AppConfig,
        preferences: SharedPreferences,
        client: Arc<dyn AsyncHttpClient>,
        mut recovery: Box<dyn RecoveryStore>,
    ) -> Result<Self, AppError> {
        let tile_cache = TileCache::open(
            config.tile_cache.clone(),
            client,
            Arc::new(preferences.clone()),
        )?;

        let recovered = recovery.load_pending().map(|session| {
            info!(
                segments = session.snapshot.segments.len(),
                points = session.snapshot.point_count(),
                waypoints = session.snapshot.waypoints.len(),
                "Unfinished session found"
            );
            PendingRecovery {
                session,
                announced: false,
            }
        });

        let files = GpxFileStore::new(&config.files_dir);
        if let Err(e) = files.remove_temporary_files() {
            warn!(error = %e, "Failed to clean up interrupted saves");
        }

        let (stopwatch, ticks) = StopWatch::with_ticker(config.tick_interval);

        info!(
            provider = preferences.current().provider.id,
            files = %config.files_dir.display(),
            "Tracker started"
        );

        Ok(Self {
            config,
            preferences,
            tile_cache,
            session: Mutex::new(TrackSession::new(recovery)),
            stopwatch,
            ticks: Mutex::new(Some(ticks)),
            files,
            recovered: Mutex::new(recovered),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn preferences(&self) -> &SharedPreferences {
        &self.preferences
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tile_cache
    }

    pub fn files(&self) -> &GpxFileStore {
        &self.files
    }

    // ─────────────────────────────────────────────────────────────────────
    // Recovery
    // ─────────────────────────────────────────────────────────────────────

    /// The session recovered at startup. Returns it once.
    pub fn take_recovered(&self) -> Option<RecoveredSession> {
        let mut recovered = self.recovered.lock();
        match recovered.as_mut() {
            Some(pending) if !pending.announced => {
                pending.announced = true;
                Some(pending.session.clone())
            }
            _ => None,
        }
    }

    /// Whether a recovered session still awaits a decision.
    pub fn has_pending_recovery(&self) -> bool {
        self.recovered.lock().is_some()
    }

    /// Saves the recovered session as a GPX file and loads it, paused.
    ///
    /// The file keeps the name the session was last saved under, or gets a
    /// default name.
    pub fn resume_recovered(&self) -> Result<PathBuf, AppError> {
        let recovered = self
            .recovered
            .lock()
            .as_ref()
            .map(|p| p.session.clone())
            .ok_or(AppError::NoRecoveredSession)?;

        let name = match &recovered.filename {
            Some(name) => name.clone(),
            None => self.default_filename()?,
        };
        let path = self
            .files
            .save(&name, &gpx::encode(&recovered.snapshot))?;

        let mut session = self.session.lock();
        if self.recovered.lock().take().is_none() {
            return Err(AppError::NoRecoveredSession);
        }
        let loaded = session.load(recovered.snapshot, Some(name));
        self.stopwatch.reset();
        info!(path = %path.display(), "Recovered session resumed");
        loaded?;
        Ok(path)
    }

    /// Drops the recovered session and deletes the journal.
    pub fn discard_recovered(&self) -> Result<(), AppError> {
        let mut session = self.session.lock();
        if self.recovered.lock().take().is_none() {
            return Err(AppError::NoRecoveredSession);
        }
        session.reset()?;
        info!("Recovered session discarded");
        Ok(())
    }

    /// Discards a recovered session nobody decided on. Runs before every
    /// change to the session.
    fn settle_recovery(&self, session: &mut TrackSession) -> Result<(), AppError> {
        if self.recovered.lock().take().is_some() {
            warn!("Discarding unclaimed recovered session");
            session.reset()?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────

    pub fn status(&self) -> TrackingStatus {
        self.session.lock().status()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.session.lock().metrics()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().export_snapshot()
    }

    /// Read access to the session under its lock.
    pub fn with_session<R>(&self, read: impl FnOnce(&TrackSession) -> R) -> R {
        read(&self.session.lock())
    }

    /// Arbitrary edit of the session under its lock, e.g. renaming a
    /// waypoint.
    pub fn with_session_mut<R>(
        &self,
        edit: impl FnOnce(&mut TrackSession) -> R,
    ) -> Result<R, AppError> {
        let mut session = self.session.lock();
        self.settle_recovery(&mut session)?;
        let result = edit(&mut session);
        self.follow_status(session.status());
        Ok(result)
    }

    pub fn start_tracking(&self) -> Result<TrackingStatus, AppError> {
        let mut session = self.session.lock();
        self.settle_recovery(&mut session)?;
        let started = session.start();
        self.follow_status(session.status());
        Ok(started?)
    }

    pub fn pause_tracking(&self) -> TrackingStatus {
        let mut session = self.session.lock();
        let status = session.pause();
        self.follow_status(status);
        status
    }

    pub fn toggle_tracking(&self) -> Result<TrackingStatus, AppError> {
        let mut session = self.session.lock();
        self.settle_recovery(&mut session)?;
        let toggled = session.toggle();
        self.follow_status(session.status());
        Ok(toggled?)
    }

    /// Empties the session and the journal. A pending recovered session is
    /// dropped too.
    pub fn reset_session(&self) -> Result<(), AppError> {
        let mut session = self.session.lock();
        self.recovered.lock().take();
        let reset = session.reset();
        self.follow_status(session.status());
        Ok(reset?)
    }

    /// Feeds one location fix. Returns whether a trackpoint was recorded.
    pub fn ingest_fix(&self, fix: LocationFix) -> Result<bool, AppError> {
        Ok(self.session.lock().ingest_fix(fix)?)
    }

    pub fn update_heading(&self, heading: Heading) {
        self.session.lock().update_heading(heading);
    }

    pub fn add_waypoint(
        &self,
        coordinate: Coordinate,
        elevation: Option<f64>,
    ) -> Result<WaypointId, AppError> {
        let mut session = self.session.lock();
        self.settle_recovery(&mut session)?;
        Ok(session.add_waypoint(coordinate, elevation, Utc::now())?)
    }

    /// Drops a waypoint at the most recent fix.
    pub fn mark_current_location(&self) -> Result<WaypointId, AppError> {
        let mut session = self.session.lock();
        let fix = session.last_fix().cloned().ok_or(AppError::NoLocationFix)?;
        self.settle_recovery(&mut session)?;
        Ok(session.add_waypoint(fix.coordinate, fix.altitude, fix.timestamp)?)
    }

    /// Writes the session as GPX and closes the journal.
    ///
    /// Without a `name` the session's previous name is reused, or a default
    /// one is rendered from the configured date pattern.
    pub fn save_session(&self, name: Option<&str>) -> Result<PathBuf, AppError> {
        let mut session = self.session.lock();
        if !session.can_save() {
            return Err(crate::session::SessionError::NothingToSave.into());
        }
        let name = match (name, session.filename()) {
            (Some(name), _) => name.to_string(),
            (None, Some(previous)) => previous.to_string(),
            (None, None) => self.default_filename()?,
        };

        let path = self
            .files
            .save(&name, &gpx::encode(&session.export_snapshot()))?;
        session.save(name)?;
        Ok(path)
    }

    /// Replaces the session with a saved file, paused.
    ///
    /// A file that fails to decode leaves the session untouched.
    pub fn open_file(&self, name: &str) -> Result<SessionMetrics, AppError> {
        let text = self.files.read(name)?;
        let snapshot = gpx::decode(&text)?;
        let stem = name.strip_suffix(".gpx").unwrap_or(name).to_string();

        let mut session = self.session.lock();
        self.settle_recovery(&mut session)?;
        let loaded = session.load(snapshot, Some(stem));
        self.stopwatch.reset();
        loaded?;
        Ok(session.metrics())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stopwatch
    // ─────────────────────────────────────────────────────────────────────

    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }

    /// Receiver of formatted elapsed-time ticks. Handed out once.
    pub fn take_elapsed_ticks(&self) -> Option<mpsc::Receiver<String>> {
        self.ticks.lock().take()
    }

    fn follow_status(&self, status: TrackingStatus) {
        match status {
            TrackingStatus::Tracking => self.stopwatch.start(),
            TrackingStatus::Paused => self.stopwatch.stop(),
            TrackingStatus::NotStarted => self.stopwatch.reset(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tiles
    // ─────────────────────────────────────────────────────────────────────

    /// Tile of the currently selected provider.
    pub async fn tile(&self, zoom: u8, x: u32, y: u32) -> Result<Bytes, TileError> {
        let provider = self.preferences.current().provider;
        self.tile_cache.get(provider.id, zoom, x, y).await
    }

    fn default_filename(&self) -> Result<String, AppError> {
        Ok(default_filename(
            &self.config.date_format,
            Utc::now(),
            self.config.date_use_utc,
        )?)
    }
}

impl std::fmt::Debug for TrackerApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerApp")
            .field("session", &*self.session.lock())
            .field("stopwatch", &self.stopwatch.state())
            .field("pending_recovery", &self.has_pending_recovery())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockHttpClient;
    use crate::recovery::MemoryRecoveryStore;
    use crate::stopwatch::StopWatchState;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fix(latitude: f64, longitude: f64) -> LocationFix {
        LocationFix::new(
            latitude,
            longitude,
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        )
    }

    fn start_app(temp: &TempDir, store: &MemoryRecoveryStore) -> TrackerApp {
        let config = AppConfig::new(temp.path()).with_date_format("{yyyy}{MM}{dd}", true);
        TrackerApp::start_with(
            config,
            SharedPreferences::default(),
            Arc::new(MockHttpClient::ok(b"png".to_vec())),
            Box::new(store.reopen()),
        )
        .unwrap()
    }

    /// Leaves an unfinished two-point session in `store`.
    fn crash_mid_recording(store: &MemoryRecoveryStore) {
        let mut session = TrackSession::new(Box::new(store.reopen()));
        session.start().unwrap();
        session.ingest_fix(fix(0.0, 0.0)).unwrap();
        session.ingest_fix(fix(0.0, 0.001)).unwrap();
        session
            .add_waypoint(Coordinate::new(0.0, 0.0005), None, Utc::now())
            .unwrap();
    }

    #[test]
    fn test_clean_start_has_nothing_to_recover() {
        let temp = TempDir::new().unwrap();
        let app = start_app(&temp, &MemoryRecoveryStore::new());

        assert!(app.take_recovered().is_none());
        assert!(!app.has_pending_recovery());
        assert_eq!(app.status(), TrackingStatus::NotStarted);
        assert!(matches!(
            app.discard_recovered(),
            Err(AppError::NoRecoveredSession)
        ));
    }

    #[test]
    fn test_recovered_session_is_announced_once() {
        let temp = TempDir::new().unwrap();
        let store = MemoryRecoveryStore::new();
        crash_mid_recording(&store);

        let app = start_app(&temp, &store);

        let recovered = app.take_recovered().unwrap();
        assert_eq!(recovered.snapshot.point_count(), 2);
        assert_eq!(recovered.snapshot.waypoints.len(), 1);
        assert!(app.take_recovered().is_none());
        assert!(app.has_pending_recovery());
    }

    #[test]
    fn test_resume_recovered_writes_file_and_loads_paused() {
        let temp = TempDir::new().unwrap();
        let store = MemoryRecoveryStore::new();
        crash_mid_recording(&store);
        let app = start_app(&temp, &store);

        let path = app.resume_recovered().unwrap();

        assert!(path.exists());
        let saved = gpx::decode(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.point_count(), 2);
        assert_eq!(app.status(), TrackingStatus::Paused);
        assert_eq!(app.metrics().point_count, 2);
        assert!(!app.has_pending_recovery());

        // the journal was closed, a restart finds nothing
        let restarted = start_app(&temp, &store);
        assert!(restarted.take_recovered().is_none());
    }

    #[test]
    fn test_discard_recovered_clears_journal() {
        let temp = TempDir::new().unwrap();
        let store = MemoryRecoveryStore::new();
        crash_mid_recording(&store);
        let app = start_app(&temp, &store);

        app.discard_recovered().unwrap();

        assert!(app.snapshot().is_empty());
        assert!(store.backend().lines().is_empty());
        assert!(start_app(&temp, &store).take_recovered().is_none());
    }

    #[test]
    fn test_new_recording_discards_undecided_recovery() {
        let temp = TempDir::new().unwrap();
        let store = MemoryRecoveryStore::new();
        crash_mid_recording(&store);
        let app = start_app(&temp, &store);

        app.start_tracking().unwrap();
        app.ingest_fix(fix(10.0, 10.0)).unwrap();

        assert!(!app.has_pending_recovery());
        let recovered = start_app(&temp, &store).take_recovered().unwrap();
        assert_eq!(recovered.snapshot.point_count(), 1);
        assert!(recovered.snapshot.waypoints.is_empty());
    }

    #[test]
    fn test_stopwatch_follows_tracking_status() {
        let temp = TempDir::new().unwrap();
        let app = start_app(&temp, &MemoryRecoveryStore::new());

        app.start_tracking().unwrap();
        assert_eq!(app.stopwatch.state(), StopWatchState::Started);

        app.pause_tracking();
        assert_eq!(app.stopwatch.state(), StopWatchState::Stopped);

        app.toggle_tracking().unwrap();
        assert_eq!(app.stopwatch.state(), StopWatchState::Started);

        app.reset_session().unwrap();
        assert_eq!(app.stopwatch.state(), StopWatchState::Stopped);
        assert_eq!(app.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_save_and_open_file() {
        let temp = TempDir::new().unwrap();
        let store = MemoryRecoveryStore::new();
        let app = start_app(&temp, &store);

        assert!(matches!(
            app.save_session(None),
            Err(AppError::Session(crate::session::SessionError::NothingToSave))
        ));

        app.start_tracking().unwrap();
        app.ingest_fix(fix(0.0, 0.0)).unwrap();
        app.ingest_fix(fix(0.0, 0.001)).unwrap();
        let id = app.mark_current_location().unwrap();
        app.with_session_mut(|s| s.rename_waypoint(id, Some("Finish".to_string())))
            .unwrap()
            .unwrap();

        let path = app.save_session(Some("evening")).unwrap();
        assert_eq!(path, temp.path().join("gpx/evening.gpx"));
        assert!(start_app(&temp, &store).take_recovered().is_none());

        app.reset_session().unwrap();
        let metrics = app.open_file("evening").unwrap();

        assert_eq!(metrics.point_count, 2);
        assert_eq!(app.status(), TrackingStatus::Paused);
        let snapshot = app.snapshot();
        assert_eq!(snapshot.waypoints[0].name.as_deref(), Some("Finish"));
        assert_eq!(
            app.with_session(|s| s.filename().map(str::to_owned)),
            Some("evening".to_string())
        );
    }

    #[test]
    fn test_default_save_name_from_pattern() {
        let temp = TempDir::new().unwrap();
        let app = start_app(&temp, &MemoryRecoveryStore::new());
        app.add_waypoint(Coordinate::new(1.0, 2.0), None).unwrap();

        let path = app.save_session(None).unwrap();

        let expected = Utc::now().format("%Y%m%d").to_string();
        assert_eq!(path.file_stem().unwrap().to_str().unwrap(), expected);
    }

    #[test]
    fn test_malformed_file_leaves_session_unchanged() {
        let temp = TempDir::new().unwrap();
        let app = start_app(&temp, &MemoryRecoveryStore::new());
        app.start_tracking().unwrap();
        app.ingest_fix(fix(0.0, 0.0)).unwrap();
        app.files().save("broken", "<gpx><trk>").unwrap();

        assert!(matches!(app.open_file("broken"), Err(AppError::Gpx(_))));

        assert_eq!(app.status(), TrackingStatus::Tracking);
        assert_eq!(app.metrics().point_count, 1);
    }

    #[test]
    fn test_mark_without_fix() {
        let temp = TempDir::new().unwrap();
        let app = start_app(&temp, &MemoryRecoveryStore::new());
        assert!(matches!(
            app.mark_current_location(),
            Err(AppError::NoLocationFix)
        ));
    }

    #[tokio::test]
    async fn test_tile_uses_selected_provider() {
        let temp = TempDir::new().unwrap();
        let app = start_app(&temp, &MemoryRecoveryStore::new());
        assert!(matches!(
            app.tile(3, 1, 2).await,
            Err(TileError::NotFetchable("apple"))
        ));

        app.preferences()
            .set_provider(crate::provider::catalog::lookup("openStreetMap").unwrap());
        let bytes = app.tile(3, 1, 2).await.unwrap();

        assert_eq!(&bytes[..], b"png");
        assert_eq!(app.tile_cache().stats().disk.entries, 1);
    }
}
