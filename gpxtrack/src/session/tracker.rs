//! The recording session state machine.
//!
//! ```text
//!              start / toggle
//!  NotStarted ───────────────► Tracking ◄──────┐
//!      ▲                          │ pause      │ resume (new segment)
//!      │ reset (any state)        ▼            │
//!      └──────────────────────  Paused ───────┘
//! ```
//!
//! Every change is forwarded to the [`RecoveryStore`] before the method
//! returns. If the store fails, the change still applies in memory and the
//! method returns [`SessionError::NotDurable`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::metrics::SessionMetrics;
use super::model::{
    LocationFix, SessionSnapshot, TrackSegment, Trackpoint, TrackingStatus, Waypoint, WaypointId,
};
use crate::coord::Coordinate;
use crate::recovery::{RecoveredSession, RecoveryError, RecoveryStore};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("waypoint {0} not found")]
    WaypointNotFound(WaypointId),

    /// Save requested with no track and no waypoints.
    #[error("nothing to save")]
    NothingToSave,

    /// The change was applied but could not be written to the recovery
    /// journal.
    #[error("change applied but not persisted for recovery: {source}")]
    NotDurable {
        /// Id of the waypoint the change created, if any.
        waypoint: Option<WaypointId>,
        #[source]
        source: RecoveryError,
    },
}

impl SessionError {
    fn not_durable(waypoint: Option<WaypointId>) -> impl FnOnce(RecoveryError) -> Self {
        move |source| {
            warn!(error = %source, "Session change not persisted for recovery");
            SessionError::NotDurable { waypoint, source }
        }
    }
}

/// Device heading, degrees clockwise from north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub true_heading: f64,
    pub magnetic_heading: f64,
}

/// Root aggregate of a recording.
pub struct TrackSession {
    status: TrackingStatus,
    segments: Vec<TrackSegment>,
    waypoints: BTreeMap<WaypointId, Waypoint>,
    next_waypoint_id: u64,
    metrics: SessionMetrics,
    filename: Option<String>,
    last_fix: Option<LocationFix>,
    heading: Option<Heading>,
    recovery: Box<dyn RecoveryStore>,
}

impl TrackSession {
    /// Creates an empty session mirroring into `recovery`.
    pub fn new(recovery: Box<dyn RecoveryStore>) -> Self {
        Self {
            status: TrackingStatus::NotStarted,
            segments: Vec::new(),
            waypoints: BTreeMap::new(),
            next_waypoint_id: 0,
            metrics: SessionMetrics::default(),
            filename: None,
            last_fix: None,
            heading: None,
            recovery,
        }
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
    }

    pub fn segments(&self) -> &[TrackSegment] {
        &self.segments
    }

    /// Waypoints with their ids, in creation order.
    pub fn waypoints(&self) -> impl Iterator<Item = (WaypointId, &Waypoint)> {
        self.waypoints.iter().map(|(id, wp)| (*id, wp))
    }

    pub fn waypoint(&self, id: WaypointId) -> Option<&Waypoint> {
        self.waypoints.get(&id)
    }

    /// Name the session was last saved or loaded under.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Most recent fix, whatever the tracking state.
    pub fn last_fix(&self) -> Option<&LocationFix> {
        self.last_fix.as_ref()
    }

    pub fn heading(&self) -> Option<Heading> {
        self.heading
    }

    /// True when there is neither track nor waypoint.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty() && self.segments.iter().all(TrackSegment::is_empty)
    }

    /// False before tracking has ever started unless a waypoint was placed.
    pub fn can_save(&self) -> bool {
        self.status != TrackingStatus::NotStarted || !self.waypoints.is_empty()
    }

    /// Starts recording, or resumes from pause into a new segment.
    /// Does nothing while already tracking.
    pub fn start(&mut self) -> Result<TrackingStatus, SessionError> {
        match self.status {
            TrackingStatus::Tracking => Ok(self.status),
            TrackingStatus::NotStarted | TrackingStatus::Paused => {
                let previous = self.status;
                self.status = TrackingStatus::Tracking;
                self.segments.push(TrackSegment::new());
                self.metrics.record_new_segment();
                let segment = self.segments.len() - 1;
                info!(from = %previous, segment, "Tracking started");
                self.recovery
                    .mark_segment_boundary(segment)
                    .map_err(SessionError::not_durable(None))?;
                Ok(self.status)
            }
        }
    }

    /// Stops point ingestion. Only valid while tracking.
    pub fn pause(&mut self) -> TrackingStatus {
        if self.status == TrackingStatus::Tracking {
            self.status = TrackingStatus::Paused;
            if self.segments.last().is_some_and(TrackSegment::is_empty) {
                self.segments.pop();
                self.metrics.record_dropped_empty_segment(&self.segments);
            }
            info!(segments = self.segments.len(), "Tracking paused");
        }
        self.status
    }

    /// Start/pause button: not started or paused → tracking, tracking → paused.
    pub fn toggle(&mut self) -> Result<TrackingStatus, SessionError> {
        match self.status {
            TrackingStatus::Tracking => Ok(self.pause()),
            TrackingStatus::NotStarted | TrackingStatus::Paused => self.start(),
        }
    }

    /// Clears everything and deletes the recovery journal.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.status = TrackingStatus::NotStarted;
        self.segments.clear();
        self.waypoints.clear();
        self.next_waypoint_id = 0;
        self.metrics = SessionMetrics::default();
        self.filename = None;
        info!("Session reset");
        self.recovery
            .clear()
            .map_err(SessionError::not_durable(None))
    }

    /// Records a location update.
    ///
    /// Returns whether a trackpoint was appended; fixes outside `Tracking`
    /// only update [`last_fix`](Self::last_fix).
    pub fn ingest_fix(&mut self, fix: LocationFix) -> Result<bool, SessionError> {
        let tracking = self.status == TrackingStatus::Tracking;
        let point = fix.to_trackpoint();
        self.last_fix = Some(fix);
        if !tracking {
            return Ok(false);
        }

        if self.segments.is_empty() {
            self.segments.push(TrackSegment::new());
            self.metrics.record_new_segment();
        }
        let segment = self.segments.len() - 1;
        let journaled = self.recovery.append_point(segment, &point);

        let current = &mut self.segments[segment];
        self.metrics.record_point(current.points.last(), &point);
        debug!(
            segment,
            latitude = point.latitude,
            longitude = point.longitude,
            total_m = self.metrics.total_distance,
            "Trackpoint recorded"
        );
        current.points.push(point);

        journaled.map_err(SessionError::not_durable(None))?;
        Ok(true)
    }

    /// Heading updates are shown but never recorded.
    pub fn update_heading(&mut self, heading: Heading) {
        self.heading = Some(Heading {
            true_heading: heading.true_heading.rem_euclid(360.0),
            magnetic_heading: heading.magnetic_heading.rem_euclid(360.0),
        });
    }

    /// Adds a waypoint in any state.
    pub fn add_waypoint(
        &mut self,
        coordinate: Coordinate,
        elevation: Option<f64>,
        time: DateTime<Utc>,
    ) -> Result<WaypointId, SessionError> {
        let id = WaypointId(self.next_waypoint_id);
        self.next_waypoint_id += 1;
        let waypoint = Waypoint::new(coordinate, elevation, time);

        let journaled = self.recovery.append_waypoint(id, &waypoint);
        self.waypoints.insert(id, waypoint);
        debug!(waypoint = %id, %coordinate, "Waypoint added");

        journaled.map_err(SessionError::not_durable(Some(id)))?;
        Ok(id)
    }

    pub fn remove_waypoint(&mut self, id: WaypointId) -> Result<Waypoint, SessionError> {
        let removed = self
            .waypoints
            .remove(&id)
            .ok_or(SessionError::WaypointNotFound(id))?;
        debug!(waypoint = %id, "Waypoint removed");
        self.recovery
            .remove_waypoint(id)
            .map_err(SessionError::not_durable(Some(id)))?;
        Ok(removed)
    }

    /// Sets or clears a waypoint's name.
    pub fn rename_waypoint(
        &mut self,
        id: WaypointId,
        name: Option<String>,
    ) -> Result<(), SessionError> {
        self.edit_waypoint(id, |wp| wp.name = name)
    }

    pub fn describe_waypoint(
        &mut self,
        id: WaypointId,
        description: Option<String>,
    ) -> Result<(), SessionError> {
        self.edit_waypoint(id, |wp| wp.description = description)
    }

    fn edit_waypoint(
        &mut self,
        id: WaypointId,
        edit: impl FnOnce(&mut Waypoint),
    ) -> Result<(), SessionError> {
        let waypoint = self
            .waypoints
            .get_mut(&id)
            .ok_or(SessionError::WaypointNotFound(id))?;
        edit(waypoint);
        self.recovery
            .update_waypoint(id, waypoint)
            .map_err(SessionError::not_durable(Some(id)))
    }

    /// Copy of the track and waypoints for export.
    pub fn export_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            segments: self.segments.clone(),
            waypoints: self.waypoints.values().cloned().collect(),
        }
    }

    /// Replaces the whole session, leaving it paused.
    ///
    /// Empty segments are dropped and waypoints renumbered in order. The
    /// journal is compacted to the loaded state and marked closed, since the
    /// data already exists as a file.
    pub fn load(
        &mut self,
        snapshot: SessionSnapshot,
        filename: Option<String>,
    ) -> Result<(), SessionError> {
        self.segments = snapshot
            .segments
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        self.waypoints = snapshot
            .waypoints
            .into_iter()
            .enumerate()
            .map(|(i, wp)| (WaypointId(i as u64), wp))
            .collect();
        self.next_waypoint_id = self.waypoints.len() as u64;
        self.metrics = SessionMetrics::from_segments(&self.segments);
        self.status = TrackingStatus::Paused;
        self.filename = filename;

        info!(
            segments = self.metrics.segment_count,
            points = self.metrics.point_count,
            waypoints = self.waypoints.len(),
            distance_m = self.metrics.total_distance,
            filename = self.filename.as_deref().unwrap_or(""),
            "Session loaded"
        );

        let ids: Vec<WaypointId> = self.waypoints.keys().copied().collect();
        let snapshot = self.export_snapshot();
        self.recovery
            .checkpoint(&snapshot, &ids, self.filename.as_deref())
            .and_then(|()| self.recovery.mark_closed(self.filename.as_deref()))
            .map_err(SessionError::not_durable(None))
    }

    /// Loads a session recovered from the journal.
    pub fn restore(&mut self, recovered: RecoveredSession) -> Result<(), SessionError> {
        self.load(recovered.snapshot, recovered.filename)
    }

    /// Records that the session was written out as `filename`.
    ///
    /// The journal is closed; recording may continue and reopens it.
    pub fn save(&mut self, filename: impl Into<String>) -> Result<(), SessionError> {
        if !self.can_save() {
            return Err(SessionError::NothingToSave);
        }
        let filename = filename.into();
        info!(filename = %filename, "Session saved");
        self.filename = Some(filename);
        self.recovery
            .mark_closed(self.filename.as_deref())
            .map_err(SessionError::not_durable(None))
    }
}

impl std::fmt::Debug for TrackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSession")
            .field("status", &self.status)
            .field("metrics", &self.metrics)
            .field("waypoints", &self.waypoints.len())
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}
