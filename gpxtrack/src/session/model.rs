//! Track data model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coord::{haversine_distance, Coordinate};

/// Recording state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    NotStarted,
    Tracking,
    Paused,
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackingStatus::NotStarted => "not started",
            TrackingStatus::Tracking => "tracking",
            TrackingStatus::Paused => "paused",
        })
    }
}

/// One GPS fix recorded while tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trackpoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    /// Radius of uncertainty in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl Trackpoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            horizontal_accuracy: None,
            time: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn distance_to(&self, other: &Trackpoint) -> f64 {
        haversine_distance(&self.coordinate(), &other.coordinate())
    }
}

/// Uninterrupted run of points between a start/resume and the next pause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    pub points: Vec<Trackpoint>,
}

impl TrackSegment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of great-circle distances between consecutive points.
    pub fn distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| pair[0].distance_to(&pair[1]))
            .sum()
    }
}

impl From<Vec<Trackpoint>> for TrackSegment {
    fn from(points: Vec<Trackpoint>) -> Self {
        Self { points }
    }
}

/// Session-local waypoint identifier. Ids increase in creation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WaypointId(pub u64);

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A point of interest placed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl Waypoint {
    pub fn new(coordinate: Coordinate, elevation: Option<f64>, time: DateTime<Utc>) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            elevation,
            name: None,
            description: None,
            time: Some(time),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Immutable copy of a session's track and waypoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub segments: Vec<TrackSegment>,
    /// Waypoints in creation order.
    pub waypoints: Vec<Waypoint>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty() && self.segments.iter().all(TrackSegment::is_empty)
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }

    pub fn total_distance(&self) -> f64 {
        self.segments.iter().map(TrackSegment::distance).sum()
    }
}

/// Position update pushed by the location feed.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub altitude: Option<f64>,
    /// Negative or `None` when unknown.
    pub horizontal_accuracy: Option<f64>,
    /// Metres per second; negative or `None` when unknown.
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate: Coordinate::new(latitude, longitude),
            altitude: None,
            horizontal_accuracy: None,
            speed: None,
            timestamp,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, horizontal_accuracy: f64) -> Self {
        self.horizontal_accuracy = Some(horizontal_accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn to_trackpoint(&self) -> Trackpoint {
        Trackpoint {
            latitude: self.coordinate.latitude,
            longitude: self.coordinate.longitude,
            elevation: self.altitude,
            horizontal_accuracy: self.horizontal_accuracy.filter(|a| *a >= 0.0),
            time: Some(self.timestamp),
        }
    }
}
