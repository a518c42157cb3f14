//! Journal-backed [`RecoveryStore`] over pluggable storage.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::record::{JournalRecord, Replay};
use super::{RecoveredSession, RecoveryError, RecoveryStore};
use crate::session::{SessionSnapshot, Trackpoint, Waypoint, WaypointId};

/// Directory under the data dir holding the journal.
pub const JOURNAL_DIR_NAME: &str = "recovery";

/// Journal file name.
pub const JOURNAL_FILE_NAME: &str = "session.jsonl";

/// Storage for journal lines.
pub trait JournalBackend: Send {
    /// Appends one line durably.
    fn append_line(&mut self, line: &str) -> Result<(), RecoveryError>;

    /// Atomically replaces the journal with `lines`.
    fn replace(&mut self, lines: &[String]) -> Result<(), RecoveryError>;

    /// Reads every complete line. A torn final line is dropped.
    fn read_lines(&mut self) -> Result<Vec<String>, RecoveryError>;

    /// Deletes the journal; deleting a missing journal succeeds.
    fn remove(&mut self) -> Result<(), RecoveryError>;
}

/// [`RecoveryStore`] writing one JSON record per journal line.
#[derive(Debug)]
pub struct Journal<B> {
    backend: B,
    /// Last record written was `Closed`.
    closed: bool,
}

/// Journal stored in a file.
pub type JournalRecoveryStore = Journal<FileBackend>;

/// Journal kept in memory, shareable across store instances.
pub type MemoryRecoveryStore = Journal<MemoryBackend>;

impl<B: JournalBackend> Journal<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            closed: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn append(&mut self, record: &JournalRecord) -> Result<(), RecoveryError> {
        if self.closed {
            self.write(&JournalRecord::Reopened)?;
            self.closed = false;
        }
        self.write(record)
    }

    fn write(&mut self, record: &JournalRecord) -> Result<(), RecoveryError> {
        let line = serde_json::to_string(record)?;
        self.backend.append_line(&line)
    }

    fn replay(&mut self) -> Result<Replay, RecoveryError> {
        let mut replay = Replay::default();
        for (index, line) in self.backend.read_lines()?.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord =
                serde_json::from_str(line).map_err(|e| RecoveryError::Corrupt {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            replay.apply(record);
        }
        Ok(replay)
    }

    fn discard(&mut self) {
        if let Err(e) = self.backend.remove() {
            warn!(error = %e, "Failed to remove recovery journal");
        }
        self.closed = false;
    }
}

impl JournalRecoveryStore {
    /// Store whose journal lives in `<data_dir>/recovery/session.jsonl`.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir
            .as_ref()
            .join(JOURNAL_DIR_NAME)
            .join(JOURNAL_FILE_NAME);
        Self::with_backend(FileBackend::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.backend.path
    }
}

impl MemoryRecoveryStore {
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::default())
    }

    /// A second store over the same lines, as a restarted process would see
    /// them.
    pub fn reopen(&self) -> Self {
        Self::with_backend(self.backend.clone())
    }
}

impl Default for MemoryRecoveryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: JournalBackend> RecoveryStore for Journal<B> {
    fn mark_segment_boundary(&mut self, segment: usize) -> Result<(), RecoveryError> {
        self.append(&JournalRecord::SegmentStarted { segment })
    }

    fn append_point(&mut self, segment: usize, point: &Trackpoint) -> Result<(), RecoveryError> {
        self.append(&JournalRecord::Point {
            segment,
            point: point.clone(),
        })
    }

    fn append_waypoint(
        &mut self,
        id: WaypointId,
        waypoint: &Waypoint,
    ) -> Result<(), RecoveryError> {
        self.append(&JournalRecord::Waypoint {
            id,
            waypoint: waypoint.clone(),
        })
    }

    fn update_waypoint(
        &mut self,
        id: WaypointId,
        waypoint: &Waypoint,
    ) -> Result<(), RecoveryError> {
        self.append(&JournalRecord::WaypointUpdated {
            id,
            waypoint: waypoint.clone(),
        })
    }

    fn remove_waypoint(&mut self, id: WaypointId) -> Result<(), RecoveryError> {
        self.append(&JournalRecord::WaypointRemoved { id })
    }

    fn checkpoint(
        &mut self,
        snapshot: &SessionSnapshot,
        waypoint_ids: &[WaypointId],
        filename: Option<&str>,
    ) -> Result<(), RecoveryError> {
        let record = JournalRecord::Checkpoint {
            snapshot: snapshot.clone(),
            waypoint_ids: waypoint_ids.to_vec(),
            filename: filename.map(str::to_string),
        };
        let line = serde_json::to_string(&record)?;
        self.backend.replace(&[line])?;
        self.closed = false;
        debug!(
            points = snapshot.point_count(),
            waypoints = snapshot.waypoints.len(),
            "Recovery journal compacted to checkpoint"
        );
        Ok(())
    }

    fn mark_closed(&mut self, filename: Option<&str>) -> Result<(), RecoveryError> {
        if self.closed {
            return Ok(());
        }
        self.write(&JournalRecord::Closed {
            filename: filename.map(str::to_string),
        })?;
        self.closed = true;
        Ok(())
    }

    fn load_pending(&mut self) -> Option<RecoveredSession> {
        let pending = match self.replay() {
            Ok(replay) => replay.into_pending(),
            Err(e) => {
                warn!(error = %e, "Recovery journal unreadable, nothing to recover");
                None
            }
        };

        match &pending {
            Some(session) => info!(
                points = session.snapshot.point_count(),
                segments = session.snapshot.segments.len(),
                waypoints = session.snapshot.waypoints.len(),
                filename = session.filename.as_deref().unwrap_or(""),
                "Found unfinished session"
            ),
            // stale journals must not leak into the next session
            None => self.discard(),
        }
        pending
    }

    fn clear(&mut self) -> Result<(), RecoveryError> {
        self.backend.remove()?;
        self.closed = false;
        debug!("Recovery journal cleared");
        Ok(())
    }
}

/// Journal file with an fsync after every line.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Option<File>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn io_err(&self, source: std::io::Error) -> RecoveryError {
        RecoveryError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn ensure_parent(&self) -> Result<(), RecoveryError> {
        match self.path.parent() {
            Some(parent) => fs::create_dir_all(parent).map_err(|e| self.io_err(e)),
            None => Ok(()),
        }
    }

    fn open_for_append(&mut self) -> Result<&mut File, RecoveryError> {
        if self.file.is_none() {
            self.ensure_parent()?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| self.io_err(e))?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| RecoveryError::Unavailable("journal file not open".to_string()))
    }

    fn sync_parent_dir(&self) {
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }
}

impl JournalBackend for FileBackend {
    fn append_line(&mut self, line: &str) -> Result<(), RecoveryError> {
        let path = self.path.clone();
        let file = self.open_for_append()?;
        let length = file.metadata().map(|m| m.len()).ok();

        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        buffer.push('\n');

        let written = file
            .write_all(buffer.as_bytes())
            .and_then(|()| file.sync_data());
        if let Err(source) = written {
            // cut off a partial line so later appends stay readable
            if let Some(length) = length {
                let _ = file.set_len(length);
            }
            self.file = None;
            return Err(RecoveryError::Io { path, source });
        }
        Ok(())
    }

    fn replace(&mut self, lines: &[String]) -> Result<(), RecoveryError> {
        self.ensure_parent()?;
        self.file = None;

        let tmp = self.path.with_extension("jsonl.tmp");
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_err(e));
        }
        self.sync_parent_dir();
        Ok(())
    }

    fn read_lines(&mut self) -> Result<Vec<String>, RecoveryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        split_complete_lines(&bytes)
    }

    fn remove(&mut self) -> Result<(), RecoveryError> {
        self.file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// Splits journal bytes into lines, dropping an unterminated final line.
fn split_complete_lines(bytes: &[u8]) -> Result<Vec<String>, RecoveryError> {
    let mut lines = Vec::new();
    let mut rest = bytes;
    let mut number = 0;
    while let Some(end) = rest.iter().position(|b| *b == b'\n') {
        number += 1;
        let line = std::str::from_utf8(&rest[..end]).map_err(|e| RecoveryError::Corrupt {
            line: number,
            reason: e.to_string(),
        })?;
        lines.push(line.to_string());
        rest = &rest[end + 1..];
    }
    if !rest.is_empty() {
        warn!(
            bytes = rest.len(),
            "Ignoring torn final line in recovery journal"
        );
    }
    Ok(lines)
}

#[derive(Debug, Default)]
struct MemoryLines {
    lines: Vec<String>,
    failing: bool,
}

/// In-memory journal lines. Clones share the same lines.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryLines>>,
}

impl MemoryBackend {
    /// Makes every subsequent write fail, as a full disk would.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().lines.clone()
    }

    fn check(&self) -> Result<(), RecoveryError> {
        if self.inner.lock().failing {
            Err(RecoveryError::Unavailable("memory journal set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

impl JournalBackend for MemoryBackend {
    fn append_line(&mut self, line: &str) -> Result<(), RecoveryError> {
        self.check()?;
        self.inner.lock().lines.push(line.to_string());
        Ok(())
    }

    fn replace(&mut self, lines: &[String]) -> Result<(), RecoveryError> {
        self.check()?;
        self.inner.lock().lines = lines.to_vec();
        Ok(())
    }

    fn read_lines(&mut self) -> Result<Vec<String>, RecoveryError> {
        Ok(self.lines())
    }

    fn remove(&mut self) -> Result<(), RecoveryError> {
        self.check()?;
        self.inner.lock().lines.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TrackSegment;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn point(lon: f64) -> Trackpoint {
        Trackpoint {
            time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()),
            ..Trackpoint::new(45.5, lon)
        }
    }

    fn waypoint() -> Waypoint {
        Waypoint::new(
            crate::coord::Coordinate::new(1.0, 2.0),
            Some(10.0),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_file_journal_survives_restart() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = JournalRecoveryStore::open(temp.path());
            store.mark_segment_boundary(0).unwrap();
            store.append_point(0, &point(1.0)).unwrap();
            store.append_point(0, &point(1.001)).unwrap();
            store.append_waypoint(WaypointId(0), &waypoint()).unwrap();
            assert!(store.path().ends_with("recovery/session.jsonl"));
        }

        let mut store = JournalRecoveryStore::open(temp.path());
        let recovered = store.load_pending().unwrap();

        assert_eq!(recovered.snapshot.point_count(), 2);
        assert_eq!(recovered.snapshot.waypoints, vec![waypoint()]);
        assert_eq!(recovered.waypoint_ids, vec![WaypointId(0)]);
    }

    #[test]
    fn test_mark_closed_hides_session_and_discards_journal() {
        let temp = TempDir::new().unwrap();
        let mut store = JournalRecoveryStore::open(temp.path());
        store.append_point(0, &point(1.0)).unwrap();
        store.mark_closed(Some("walk")).unwrap();

        let mut restarted = JournalRecoveryStore::open(temp.path());
        assert!(restarted.load_pending().is_none());
        assert!(!restarted.path().exists());
    }

    #[test]
    fn test_append_after_close_reopens() {
        let temp = TempDir::new().unwrap();
        let mut store = JournalRecoveryStore::open(temp.path());
        store.append_point(0, &point(1.0)).unwrap();
        store.mark_closed(Some("walk")).unwrap();
        store.append_point(0, &point(2.0)).unwrap();

        let mut restarted = JournalRecoveryStore::open(temp.path());
        let recovered = restarted.load_pending().unwrap();
        assert_eq!(recovered.snapshot.point_count(), 2);
        assert_eq!(recovered.filename.as_deref(), Some("walk"));
    }

    #[test]
    fn test_torn_final_line_is_ignored() {
        let temp = TempDir::new().unwrap();
        let mut store = JournalRecoveryStore::open(temp.path());
        store.append_point(0, &point(1.0)).unwrap();
        let path = store.path().to_path_buf();
        drop(store);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"kind":"point","segm"#).unwrap();
        drop(file);

        let mut restarted = JournalRecoveryStore::open(temp.path());
        let recovered = restarted.load_pending().unwrap();
        assert_eq!(recovered.snapshot.point_count(), 1);
    }

    #[test]
    fn test_corrupt_journal_is_nothing_to_recover() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(JOURNAL_DIR_NAME);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(JOURNAL_FILE_NAME), "not json\n{\"kind\":\"reopened\"}\n").unwrap();

        let mut store = JournalRecoveryStore::open(temp.path());
        assert!(store.load_pending().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_checkpoint_compacts() {
        let temp = TempDir::new().unwrap();
        let mut store = JournalRecoveryStore::open(temp.path());
        for i in 0..10 {
            store.append_point(0, &point(f64::from(i))).unwrap();
        }
        let snapshot = SessionSnapshot {
            segments: vec![TrackSegment::from(vec![point(9.0)])],
            waypoints: vec![],
        };
        store.checkpoint(&snapshot, &[], Some("loaded")).unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);

        let recovered = JournalRecoveryStore::open(temp.path()).load_pending().unwrap();
        assert_eq!(recovered.snapshot, snapshot);
        assert_eq!(recovered.filename.as_deref(), Some("loaded"));
    }

    #[test]
    fn test_clear_removes_file() {
        let temp = TempDir::new().unwrap();
        let mut store = JournalRecoveryStore::open(temp.path());
        store.append_point(0, &point(1.0)).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
        assert!(JournalRecoveryStore::open(temp.path()).load_pending().is_none());
    }

    #[test]
    fn test_memory_store_reopen_shares_lines() {
        let mut store = MemoryRecoveryStore::new();
        store.append_point(0, &point(1.0)).unwrap();

        let recovered = store.reopen().load_pending().unwrap();
        assert_eq!(recovered.snapshot.point_count(), 1);

        store.backend().set_failing(true);
        assert!(store.append_point(0, &point(2.0)).is_err());
        assert_eq!(store.backend().lines().len(), 1);
    }

    #[test]
    fn test_split_complete_lines() {
        assert_eq!(split_complete_lines(b"a\nb\nc").unwrap(), vec!["a", "b"]);
        assert!(split_complete_lines(b"").unwrap().is_empty());
    }
}
