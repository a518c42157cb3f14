//! `gpx info` command.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::Subcommand;
use gpxtrack::config::ConfigFile;
use gpxtrack::gpx;
use gpxtrack::session::SessionSnapshot;
use gpxtrack::units::{format_distance, Units};

use crate::error::CliError;

/// GPX file subcommands.
#[derive(Debug, Subcommand)]
pub enum GpxCommands {
    /// Decode a GPX file and summarise its track and waypoints
    Info {
        /// Path to the GPX file
        file: PathBuf,
    },
}

/// Run a gpx subcommand.
pub fn run(command: GpxCommands, config: &ConfigFile) -> Result<(), CliError> {
    match command {
        GpxCommands::Info { file } => {
            let snapshot = read_gpx(&file)?;
            println!("{}", file.display());
            for line in summarize(&snapshot, config.tracking.units) {
                println!("  {}", line);
            }
            Ok(())
        }
    }
}

/// Reads and decodes a GPX file.
pub fn read_gpx(path: &Path) -> Result<SessionSnapshot, CliError> {
    let text = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    gpx::decode(&text).map_err(|source| CliError::Gpx {
        path: path.to_path_buf(),
        source,
    })
}

/// Human readable summary lines for a snapshot.
pub fn summarize(snapshot: &SessionSnapshot, units: Units) -> Vec<String> {
    let mut lines = vec![
        format!("Segments:  {}", snapshot.segments.len()),
        format!("Points:    {}", snapshot.point_count()),
        format!("Waypoints: {}", snapshot.waypoints.len()),
        format!(
            "Distance:  {}",
            format_distance(snapshot.total_distance(), units)
        ),
    ];

    if let Some((first, last)) = time_span(snapshot) {
        lines.push(format!(
            "Recorded:  {} to {} ({})",
            first.format("%Y-%m-%d %H:%M:%S UTC"),
            last.format("%Y-%m-%d %H:%M:%S UTC"),
            format_duration(last - first)
        ));
    }
    lines
}

fn time_span(snapshot: &SessionSnapshot) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let mut times = snapshot
        .segments
        .iter()
        .flat_map(|s| s.points.iter())
        .filter_map(|p| p.time);
    let first = times.next()?;
    let (min, max) = times.fold((first, first), |(min, max), t| (min.min(t), max.max(t)));
    Some((min, max))
}

fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="0.0" lon="0.0"><name>Start</name></wpt>
  <trk>
    <trkseg>
      <trkpt lat="0.0" lon="0.0"><time>2024-03-05T14:00:00Z</time></trkpt>
      <trkpt lat="0.0" lon="0.001"><time>2024-03-05T14:01:30Z</time></trkpt>
    </trkseg>
    <trkseg/>
  </trk>
</gpx>"#;

    #[test]
    fn test_summarize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ride.gpx");
        fs::write(&path, TRACK).unwrap();

        let snapshot = read_gpx(&path).unwrap();
        let lines = summarize(&snapshot, Units::Metric);

        assert_eq!(lines[0], "Segments:  2");
        assert_eq!(lines[1], "Points:    2");
        assert_eq!(lines[2], "Waypoints: 1");
        assert!(lines[4].ends_with("(1m 30s)"), "{}", lines[4]);
    }

    #[test]
    fn test_summary_without_times() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(summarize(&snapshot, Units::Imperial).len(), 4);
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gpx");
        fs::write(&path, "<gpx><trk>").unwrap();

        match read_gpx(&path) {
            Err(CliError::Gpx { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Gpx error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = read_gpx(Path::new("/nonexistent/ride.gpx"));
        assert!(matches!(result, Err(CliError::Io { .. })));
    }
}
