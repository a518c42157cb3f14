//! Track recording session.
//!
//! [`TrackSession`] turns location fixes and user actions into an ordered
//! list of segments plus a set of waypoints, keeps distance metrics current,
//! and mirrors every change into a [`crate::recovery::RecoveryStore`].

mod metrics;
mod model;
mod tracker;

pub use metrics::SessionMetrics;
pub use model::{
    LocationFix, SessionSnapshot, TrackSegment, Trackpoint, TrackingStatus, Waypoint, WaypointId,
};
pub use tracker::{Heading, SessionError, TrackSession};
