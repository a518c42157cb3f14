//! Crash recovery for the active session.
//!
//! Every change to the session is appended to a journal before the call
//! returns. On the next start [`RecoveryStore::load_pending`] replays the
//! journal; a session that was saved or reset leaves nothing to recover.
//!
//! # Journal
//!
//! ```text
//! {"kind":"segment_started","segment":0}
//! {"kind":"point","segment":0,"point":{"latitude":..,"longitude":..,"time":..}}
//! {"kind":"waypoint","id":0,"waypoint":{..}}
//! {"kind":"closed","filename":"05-Mar-2024-1407"}
//! {"kind":"reopened"}
//! ```
//!
//! A checkpoint record replaces everything before it and is written by
//! compacting the journal to that single record.

mod journal;
mod record;

use std::path::PathBuf;

use thiserror::Error;

use crate::session::{SessionSnapshot, Trackpoint, Waypoint, WaypointId};

pub use record::JournalRecord;
pub use journal::{
    FileBackend, Journal, JournalBackend, JournalRecoveryStore, MemoryBackend,
    MemoryRecoveryStore, JOURNAL_DIR_NAME, JOURNAL_FILE_NAME,
};

/// Errors from the recovery journal.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("recovery journal I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode recovery record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The journal cannot be replayed.
    #[error("recovery journal corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("recovery journal unavailable: {0}")]
    Unavailable(String),
}

/// An unfinished session found at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredSession {
    pub snapshot: SessionSnapshot,
    /// Name the session was last saved under, if any.
    pub filename: Option<String>,
    /// Journal ids of `snapshot.waypoints`, index for index.
    pub waypoint_ids: Vec<WaypointId>,
}

/// Durable mirror of the active session.
///
/// Every method that records a change must have made it durable by the time
/// it returns.
pub trait RecoveryStore: Send {
    /// A segment with index `segment` begins.
    fn mark_segment_boundary(&mut self, segment: usize) -> Result<(), RecoveryError>;

    fn append_point(&mut self, segment: usize, point: &Trackpoint) -> Result<(), RecoveryError>;

    fn append_waypoint(&mut self, id: WaypointId, waypoint: &Waypoint)
        -> Result<(), RecoveryError>;

    fn update_waypoint(&mut self, id: WaypointId, waypoint: &Waypoint)
        -> Result<(), RecoveryError>;

    fn remove_waypoint(&mut self, id: WaypointId) -> Result<(), RecoveryError>;

    /// Replaces the journal with the full session state.
    fn checkpoint(
        &mut self,
        snapshot: &SessionSnapshot,
        waypoint_ids: &[WaypointId],
        filename: Option<&str>,
    ) -> Result<(), RecoveryError>;

    /// The session was saved (or is otherwise complete). The next
    /// `load_pending` returns `None` unless something is appended first.
    fn mark_closed(&mut self, filename: Option<&str>) -> Result<(), RecoveryError>;

    /// Replays the journal. Called once at startup.
    ///
    /// Closed, empty and unreadable journals yield `None` and are discarded.
    fn load_pending(&mut self) -> Option<RecoveredSession>;

    /// Deletes the journal.
    fn clear(&mut self) -> Result<(), RecoveryError>;
}
