//! Saved GPX files.
//!
//! A [`GpxFileStore`] owns one directory of `*.gpx` files. Writes go to a
//! hidden temporary file first and are renamed into place, so a crash never
//! leaves a half-written track under its real name.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use crate::config::format_size as format_file_size;

/// Extension of saved files.
pub const GPX_EXTENSION: &str = "gpx";

/// Prefix of in-progress writes.
const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("invalid file name {0:?}")]
    InvalidName(String),

    #[error("no saved file named {0:?}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileStoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One entry of [`GpxFileStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpxFileInfo {
    /// File name without the `.gpx` extension.
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// `size` for humans, e.g. `1.5 KB`.
    pub size_text: String,
}

#[derive(Debug, Clone)]
pub struct GpxFileStore {
    directory: PathBuf,
}

impl GpxFileStore {
    /// Creates a store over `directory`. Nothing is touched until the first
    /// write.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file saved as `name`. A trailing `.gpx` is accepted.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, FileStoreError> {
        let stem = validate_name(name)?;
        Ok(self
            .directory
            .join(format!("{}.{}", stem, GPX_EXTENSION)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Writes `text` as `name.gpx`, replacing any previous file of that name.
    pub fn save(&self, name: &str, text: &str) -> Result<PathBuf, FileStoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.directory)
            .map_err(|e| FileStoreError::io(&self.directory, e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self.directory.join(format!("{}{}", TEMP_PREFIX, file_name));

        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(FileStoreError::io(&path, e));
        }

        info!(path = %path.display(), bytes = text.len(), "Saved GPX file");
        Ok(path)
    }

    /// Saved files, newest first. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<GpxFileInfo>, FileStoreError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FileStoreError::io(&self.directory, e)),
        };

        let mut files = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = gpx_stem(&path) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            files.push(GpxFileInfo {
                name,
                path,
                size: metadata.len(),
                modified,
                size_text: format_file_size(metadata.len()),
            });
        }

        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(files)
    }

    pub fn read(&self, name: &str) -> Result<String, FileStoreError> {
        let path = self.path_for(name)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FileStoreError::NotFound(name.to_string()),
            _ => FileStoreError::io(&path, e),
        })
    }

    pub fn remove(&self, name: &str) -> Result<(), FileStoreError> {
        let path = self.path_for(name)?;
        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FileStoreError::NotFound(name.to_string()),
            _ => FileStoreError::io(&path, e),
        })?;
        info!(path = %path.display(), "Removed GPX file");
        Ok(())
    }

    /// Deletes leftovers of interrupted saves. Returns how many were removed.
    pub fn remove_temporary_files(&self) -> Result<usize, FileStoreError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(FileStoreError::io(&self.directory, e)),
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(TEMP_PREFIX));
            if !is_temp {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to remove temporary file")
                }
            }
        }
        debug!(removed, "Removed temporary files");
        Ok(removed)
    }
}

fn validate_name(name: &str) -> Result<&str, FileStoreError> {
    let stem = name
        .strip_suffix(".gpx")
        .or_else(|| name.strip_suffix(".GPX"))
        .unwrap_or(name);
    let invalid = stem.trim().is_empty()
        || stem.starts_with('.')
        || stem.contains(['/', '\\', '\0']);
    if invalid {
        return Err(FileStoreError::InvalidName(name.to_string()));
    }
    Ok(stem)
}

fn gpx_stem(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') {
        return None;
    }
    let extension = path.extension()?.to_str()?;
    if !extension.eq_ignore_ascii_case(GPX_EXTENSION) {
        return None;
    }
    Some(path.file_stem()?.to_str()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    #[test]
    fn test_save_and_read() {
        let temp = TempDir::new().unwrap();
        let store = GpxFileStore::new(temp.path().join("gpx"));

        let path = store.save("05-Mar-2024-1407", "<gpx/>").unwrap();

        assert_eq!(path, temp.path().join("gpx/05-Mar-2024-1407.gpx"));
        assert_eq!(store.read("05-Mar-2024-1407").unwrap(), "<gpx/>");
        assert_eq!(store.read("05-Mar-2024-1407.gpx").unwrap(), "<gpx/>");
        assert!(store.exists("05-Mar-2024-1407"));
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let store = GpxFileStore::new(temp.path());

        store.save("ride", "first").unwrap();
        store.save("ride", "second").unwrap();

        assert_eq!(store.read("ride").unwrap(), "second");
        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["ride.gpx".to_string()]);
    }

    #[test]
    fn test_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = GpxFileStore::new(temp.path());

        let old = store.save("old", "a").unwrap();
        let new = store.save("new", "bbbb").unwrap();
        fs::write(temp.path().join("notes.txt"), "x").unwrap();
        set_file_mtime(&old, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        set_file_mtime(&new, FileTime::from_unix_time(2_000_000, 0)).unwrap();

        let files = store.list().unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "new");
        assert_eq!(files[0].size, 4);
        assert_eq!(files[0].size_text, "4 bytes");
        assert_eq!(files[1].name, "old");
        assert_eq!(files[1].modified.timestamp(), 1_000_000);
    }

    #[test]
    fn test_list_missing_directory() {
        let temp = TempDir::new().unwrap();
        let store = GpxFileStore::new(temp.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let store = GpxFileStore::new(temp.path());
        store.save("ride", "x").unwrap();

        store.remove("ride").unwrap();

        assert!(!store.exists("ride"));
        assert!(matches!(
            store.remove("ride"),
            Err(FileStoreError::NotFound(_))
        ));
        assert!(matches!(store.read("ride"), Err(FileStoreError::NotFound(_))));
    }

    #[test]
    fn test_invalid_names() {
        let store = GpxFileStore::new("/tmp");
        for name in ["", "  ", "../escape", "a/b", ".hidden", ".gpx"] {
            assert!(
                matches!(store.path_for(name), Err(FileStoreError::InvalidName(_))),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_remove_temporary_files() {
        let temp = TempDir::new().unwrap();
        let store = GpxFileStore::new(temp.path());
        store.save("keep", "x").unwrap();
        fs::write(temp.path().join(".tmp-crashed.gpx"), "partial").unwrap();

        assert_eq!(store.remove_temporary_files().unwrap(), 1);
        assert!(store.exists("keep"));
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
