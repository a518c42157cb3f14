use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::escape::escape;

use super::{CREATOR, EXTENSION_NAMESPACE, EXTENSION_PREFIX, GPX_NAMESPACE};
use crate::session::{SessionSnapshot, Trackpoint, Waypoint};

/// Serialises a snapshot to GPX 1.1 text.
pub fn encode(snapshot: &SessionSnapshot) -> String {
    let mut out = String::with_capacity(256 + snapshot.point_count() * 96);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    // writing to a String cannot fail
    let _ = write_document(&mut out, snapshot);
    out
}

fn write_document(out: &mut String, snapshot: &SessionSnapshot) -> std::fmt::Result {
    writeln!(
        out,
        "<gpx xmlns=\"{}\" xmlns:{}=\"{}\" version=\"1.1\" creator=\"{}\">",
        GPX_NAMESPACE,
        EXTENSION_PREFIX,
        EXTENSION_NAMESPACE,
        escape(CREATOR)
    )?;

    for waypoint in &snapshot.waypoints {
        write_waypoint(out, waypoint)?;
    }

    if !snapshot.segments.is_empty() {
        out.push_str("  <trk>\n");
        for segment in &snapshot.segments {
            if segment.points.is_empty() {
                out.push_str("    <trkseg/>\n");
                continue;
            }
            out.push_str("    <trkseg>\n");
            for point in &segment.points {
                write_trackpoint(out, point)?;
            }
            out.push_str("    </trkseg>\n");
        }
        out.push_str("  </trk>\n");
    }

    out.push_str("</gpx>\n");
    Ok(())
}

fn write_waypoint(out: &mut String, waypoint: &Waypoint) -> std::fmt::Result {
    writeln!(
        out,
        "  <wpt lat=\"{}\" lon=\"{}\">",
        waypoint.latitude, waypoint.longitude
    )?;
    if let Some(elevation) = waypoint.elevation {
        writeln!(out, "    <ele>{}</ele>", elevation)?;
    }
    if let Some(time) = waypoint.time {
        writeln!(out, "    <time>{}</time>", format_time(time))?;
    }
    if let Some(name) = &waypoint.name {
        writeln!(out, "    <name>{}</name>", escape(name.as_str()))?;
    }
    if let Some(description) = &waypoint.description {
        writeln!(out, "    <desc>{}</desc>", escape(description.as_str()))?;
    }
    out.push_str("  </wpt>\n");
    Ok(())
}

fn write_trackpoint(out: &mut String, point: &Trackpoint) -> std::fmt::Result {
    let open = format!(
        "      <trkpt lat=\"{}\" lon=\"{}\"",
        point.latitude, point.longitude
    );
    if point.elevation.is_none() && point.time.is_none() && point.horizontal_accuracy.is_none() {
        writeln!(out, "{}/>", open)?;
        return Ok(());
    }

    writeln!(out, "{}>", open)?;
    if let Some(elevation) = point.elevation {
        writeln!(out, "        <ele>{}</ele>", elevation)?;
    }
    if let Some(time) = point.time {
        writeln!(out, "        <time>{}</time>", format_time(time))?;
    }
    if let Some(accuracy) = point.horizontal_accuracy {
        writeln!(
            out,
            "        <extensions><{p}:hAcc>{}</{p}:hAcc></extensions>",
            accuracy,
            p = EXTENSION_PREFIX
        )?;
    }
    out.push_str("      </trkpt>\n");
    Ok(())
}

/// RFC 3339 in UTC, with as many fractional digits as needed.
pub(super) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
