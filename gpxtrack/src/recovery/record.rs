//! Journal records and replay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RecoveredSession;
use crate::session::{SessionSnapshot, TrackSegment, Trackpoint, Waypoint, WaypointId};

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    SegmentStarted {
        segment: usize,
    },
    Point {
        segment: usize,
        point: Trackpoint,
    },
    Waypoint {
        id: WaypointId,
        waypoint: Waypoint,
    },
    WaypointUpdated {
        id: WaypointId,
        waypoint: Waypoint,
    },
    WaypointRemoved {
        id: WaypointId,
    },
    Checkpoint {
        snapshot: SessionSnapshot,
        waypoint_ids: Vec<WaypointId>,
        #[serde(default)]
        filename: Option<String>,
    },
    Closed {
        #[serde(default)]
        filename: Option<String>,
    },
    Reopened,
}

/// Session state rebuilt from journal records.
#[derive(Debug, Default)]
pub struct Replay {
    segments: Vec<TrackSegment>,
    waypoints: BTreeMap<WaypointId, Waypoint>,
    filename: Option<String>,
    closed: bool,
}

impl Replay {
    pub fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::SegmentStarted { segment } => self.ensure_segment(segment),
            JournalRecord::Point { segment, point } => {
                self.ensure_segment(segment);
                self.segments[segment].points.push(point);
            }
            JournalRecord::Waypoint { id, waypoint } => {
                self.waypoints.insert(id, waypoint);
            }
            JournalRecord::WaypointUpdated { id, waypoint } => {
                if let Some(existing) = self.waypoints.get_mut(&id) {
                    *existing = waypoint;
                }
            }
            JournalRecord::WaypointRemoved { id } => {
                self.waypoints.remove(&id);
            }
            JournalRecord::Checkpoint {
                snapshot,
                waypoint_ids,
                filename,
            } => {
                self.segments = snapshot.segments;
                self.waypoints = waypoint_ids.into_iter().zip(snapshot.waypoints).collect();
                self.filename = filename;
                self.closed = false;
            }
            JournalRecord::Closed { filename } => {
                if filename.is_some() {
                    self.filename = filename;
                }
                self.closed = true;
            }
            JournalRecord::Reopened => self.closed = false,
        }
    }

    fn ensure_segment(&mut self, segment: usize) {
        if self.segments.len() <= segment {
            self.segments.resize_with(segment + 1, TrackSegment::new);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The session to offer for recovery, if the journal ended open and
    /// recorded anything.
    pub fn into_pending(self) -> Option<RecoveredSession> {
        if self.closed {
            return None;
        }
        let segments: Vec<TrackSegment> =
            self.segments.into_iter().filter(|s| !s.is_empty()).collect();
        let (waypoint_ids, waypoints): (Vec<_>, Vec<_>) = self.waypoints.into_iter().unzip();
        let snapshot = SessionSnapshot {
            segments,
            waypoints,
        };
        if snapshot.is_empty() {
            return None;
        }
        Some(RecoveredSession {
            snapshot,
            filename: self.filename,
            waypoint_ids,
        })
    }
}
