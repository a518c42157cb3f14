use std::fmt::Display;
use std::mem;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::GpxError;
use crate::session::{SessionSnapshot, TrackSegment, Trackpoint, Waypoint};

/// Parses GPX text into a snapshot.
///
/// Every `<trkseg>` of every `<trk>` becomes one segment, in document order.
/// `<wpt>` elements become waypoints. Missing `<ele>`, `<time>`, `<name>` and
/// `<desc>` are tolerated; anything else the format allows (`<metadata>`,
/// `<rte>`, unknown extensions) is skipped.
///
/// # Errors
///
/// [`GpxError::MalformedInput`] on unbalanced or mismatched tags, a root other
/// than `<gpx>`, missing or invalid `lat`/`lon`, and unparsable numbers or
/// times.
pub fn decode(text: &str) -> Result<SessionSnapshot, GpxError> {
    let mut reader = Reader::from_str(text);
    let mut parser = Parser::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(malformed_at(reader.buffer_position(), e)),
        };
        match event {
            Event::Start(e) => parser.open(&e)?,
            Event::Empty(e) => {
                parser.open(&e)?;
                parser.close()?;
            }
            Event::End(_) => parser.close()?,
            Event::Text(e) => {
                let value = e
                    .unescape()
                    .map_err(|err| malformed_at(reader.buffer_position(), err))?;
                parser.text.push_str(&value);
            }
            Event::CData(e) => {
                parser.text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    parser.finish()
}

#[derive(Default)]
struct Parser {
    stack: Vec<String>,
    text: String,
    seen_root: bool,
    point: Option<Trackpoint>,
    waypoint: Option<Waypoint>,
    snapshot: SessionSnapshot,
}

impl Parser {
    fn open(&mut self, element: &BytesStart<'_>) -> Result<(), GpxError> {
        let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();

        if self.stack.is_empty() {
            if self.seen_root {
                return Err(malformed(format!("unexpected <{}> after root element", name)));
            }
            if name != "gpx" {
                return Err(malformed(format!("root element is <{}>, expected <gpx>", name)));
            }
            self.seen_root = true;
        }

        let parent = ancestor(&self.stack, 0);
        let grandparent = ancestor(&self.stack, 1);
        match (parent, name.as_str()) {
            (Some("gpx"), "wpt") => {
                let (latitude, longitude) = parse_lat_lon(element)?;
                self.waypoint = Some(Waypoint {
                    latitude,
                    longitude,
                    elevation: None,
                    name: None,
                    description: None,
                    time: None,
                });
            }
            (Some("trk"), "trkseg") => self.snapshot.segments.push(TrackSegment::new()),
            (Some("trkseg"), "trkpt") if grandparent == Some("trk") => {
                let (latitude, longitude) = parse_lat_lon(element)?;
                self.point = Some(Trackpoint::new(latitude, longitude));
            }
            _ => {}
        }

        self.text.clear();
        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self) -> Result<(), GpxError> {
        let name = self
            .stack
            .pop()
            .ok_or_else(|| malformed("closing tag without matching opening tag"))?;
        let text = mem::take(&mut self.text);
        let parent = ancestor(&self.stack, 0);
        let grandparent = ancestor(&self.stack, 1);

        match (parent, name.as_str()) {
            (Some("trkpt"), "ele") => {
                let value = parse_optional_number("ele", &text)?;
                if let Some(point) = self.point.as_mut() {
                    point.elevation = value;
                }
            }
            (Some("trkpt"), "time") => {
                let value = parse_time(&text)?;
                if let Some(point) = self.point.as_mut() {
                    point.time = Some(value);
                }
            }
            (Some("extensions"), "hAcc") if grandparent == Some("trkpt") => {
                let value = parse_optional_number("hAcc", &text)?;
                if let Some(point) = self.point.as_mut() {
                    point.horizontal_accuracy = value;
                }
            }
            (Some("wpt"), "ele") => {
                let value = parse_optional_number("ele", &text)?;
                if let Some(waypoint) = self.waypoint.as_mut() {
                    waypoint.elevation = value;
                }
            }
            (Some("wpt"), "time") => {
                let value = parse_time(&text)?;
                if let Some(waypoint) = self.waypoint.as_mut() {
                    waypoint.time = Some(value);
                }
            }
            (Some("wpt"), "name") => {
                if let Some(waypoint) = self.waypoint.as_mut() {
                    waypoint.name = Some(text);
                }
            }
            (Some("wpt"), "desc") => {
                if let Some(waypoint) = self.waypoint.as_mut() {
                    waypoint.description = Some(text);
                }
            }
            (Some("trkseg"), "trkpt") => {
                if let (Some(point), Some(segment)) =
                    (self.point.take(), self.snapshot.segments.last_mut())
                {
                    segment.points.push(point);
                }
            }
            (Some("gpx"), "wpt") => {
                if let Some(waypoint) = self.waypoint.take() {
                    self.snapshot.waypoints.push(waypoint);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<SessionSnapshot, GpxError> {
        if let Some(open) = self.stack.last() {
            return Err(malformed(format!("document ends inside <{}>", open)));
        }
        if !self.seen_root {
            return Err(malformed("missing <gpx> root element"));
        }
        Ok(self.snapshot)
    }
}

/// Name of the open element `depth` levels above the innermost one.
fn ancestor(stack: &[String], depth: usize) -> Option<&str> {
    stack
        .len()
        .checked_sub(depth + 1)
        .and_then(|i| stack.get(i))
        .map(String::as_str)
}

fn parse_lat_lon(element: &BytesStart<'_>) -> Result<(f64, f64), GpxError> {
    let mut latitude = None;
    let mut longitude = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?;
        match attr.key.local_name().as_ref() {
            b"lat" => latitude = Some(parse_number("lat", &value)?),
            b"lon" => longitude = Some(parse_number("lon", &value)?),
            _ => {}
        }
    }

    let element_name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
    let latitude =
        latitude.ok_or_else(|| malformed(format!("<{}> without lat attribute", element_name)))?;
    let longitude =
        longitude.ok_or_else(|| malformed(format!("<{}> without lon attribute", element_name)))?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(malformed(format!("latitude {} out of range", latitude)));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(malformed(format!("longitude {} out of range", longitude)));
    }
    Ok((latitude, longitude))
}

fn parse_number(field: &str, text: &str) -> Result<f64, GpxError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| malformed(format!("invalid {} value {:?}", field, text)))
}

/// Empty text is an absent value.
fn parse_optional_number(field: &str, text: &str) -> Result<Option<f64>, GpxError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    parse_number(field, text).map(Some)
}

/// RFC 3339, or a bare ISO 8601 date-time read as UTC.
fn parse_time(text: &str) -> Result<DateTime<Utc>, GpxError> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| malformed(format!("invalid time {:?}", text)))
}

fn malformed(reason: impl Into<String>) -> GpxError {
    GpxError::MalformedInput(reason.into())
}

fn malformed_at(position: impl Display, err: impl Display) -> GpxError {
    GpxError::MalformedInput(format!("{} at byte {}", err, position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpx::encode;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const EXTERNAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Other App" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>Morning ride</name><time>2024-01-01T00:00:00Z</time></metadata>
  <wpt lat="47.1" lon="8.5"><name>Summit</name><link href="x"><text>ignored</text></link></wpt>
  <rte><rtept lat="1" lon="2"><name>route point</name></rtept></rte>
  <trk>
    <name>Track</name>
    <trkseg>
      <trkpt lat="47.0" lon="8.0"/>
      <trkpt lat="47.001" lon="8.001"><ele> 512.5 </ele></trkpt>
      <trkpt lat="47.002" lon="8.002"><time>2024-01-01T08:00:05</time></trkpt>
    </trkseg>
  </trk>
  <trk><trkseg><trkpt lat="46" lon="7"><time>2024-01-01T09:00:00+01:00</time></trkpt></trkseg></trk>
</gpx>"#;

    #[test]
    fn test_decode_external_file() {
        let snapshot = decode(EXTERNAL).unwrap();

        assert_eq!(snapshot.waypoints.len(), 1);
        assert_eq!(snapshot.waypoints[0].name.as_deref(), Some("Summit"));
        assert_eq!(snapshot.waypoints[0].elevation, None);
        assert_eq!(snapshot.waypoints[0].time, None);

        assert_eq!(snapshot.segments.len(), 2);
        let first = &snapshot.segments[0].points;
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], Trackpoint::new(47.0, 8.0));
        assert_eq!(first[1].elevation, Some(512.5));
        assert_eq!(
            first[2].time,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 5).unwrap())
        );
        assert_eq!(
            snapshot.segments[1].points[0].time,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_accuracy_extension() {
        let text = r#"<gpx xmlns:x="urn:x"><trk><trkseg>
            <trkpt lat="1" lon="2"><extensions><x:hAcc>7.25</x:hAcc></extensions></trkpt>
        </trkseg></trk></gpx>"#;
        let snapshot = decode(text).unwrap();
        assert_eq!(snapshot.segments[0].points[0].horizontal_accuracy, Some(7.25));
    }

    #[test]
    fn test_decode_escaped_text() {
        let text = r#"<gpx><wpt lat="0" lon="0"><name>A &amp; B</name><desc><![CDATA[<raw>]]></desc></wpt></gpx>"#;
        let snapshot = decode(text).unwrap();
        assert_eq!(snapshot.waypoints[0].name.as_deref(), Some("A & B"));
        assert_eq!(snapshot.waypoints[0].description.as_deref(), Some("<raw>"));
    }

    #[test]
    fn test_mismatched_tag_is_malformed() {
        let result = decode("<gpx><trk><trkseg></trk></gpx>");
        assert!(matches!(result, Err(GpxError::MalformedInput(_))));
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        let result = decode("<gpx><trk><trkseg><trkpt lat=\"1\" lon=\"2\">");
        assert!(matches!(result, Err(GpxError::MalformedInput(_))));
    }

    #[test]
    fn test_bad_coordinates_are_malformed() {
        for text in [
            r#"<gpx><wpt lat="north" lon="2"/></gpx>"#,
            r#"<gpx><wpt lon="2"/></gpx>"#,
            r#"<gpx><trk><trkseg><trkpt lat="91" lon="0"/></trkseg></trk></gpx>"#,
            r#"<gpx><trk><trkseg><trkpt lat="0" lon="NaN"/></trkseg></trk></gpx>"#,
        ] {
            assert!(
                matches!(decode(text), Err(GpxError::MalformedInput(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_empty_elevation_is_absent() {
        let text = r#"<gpx>
            <wpt lat="0" lon="0"><ele></ele><name>camp</name></wpt>
            <trk><trkseg>
                <trkpt lat="1" lon="2"><ele/></trkpt>
                <trkpt lat="1" lon="3"><ele> </ele><ele>12.5</ele></trkpt>
            </trkseg></trk>
        </gpx>"#;
        let snapshot = decode(text).unwrap();

        assert_eq!(snapshot.waypoints[0].elevation, None);
        assert_eq!(snapshot.waypoints[0].name.as_deref(), Some("camp"));
        assert_eq!(snapshot.segments[0].points[0].elevation, None);
        assert_eq!(snapshot.segments[0].points[1].elevation, Some(12.5));
    }

    #[test]
    fn test_non_numeric_elevation_is_malformed() {
        let text = r#"<gpx><wpt lat="0" lon="0"><ele>high</ele></wpt></gpx>"#;
        assert!(matches!(decode(text), Err(GpxError::MalformedInput(_))));
    }

    #[test]
    fn test_bad_time_is_malformed() {
        let text = r#"<gpx><wpt lat="0" lon="0"><time>yesterday</time></wpt></gpx>"#;
        assert!(matches!(decode(text), Err(GpxError::MalformedInput(_))));
    }

    #[test]
    fn test_wrong_root_is_malformed() {
        assert!(decode("<kml></kml>").is_err());
        assert!(decode("").is_err());
        assert!(decode("<gpx/><gpx/>").is_err());
    }

    #[test]
    fn test_empty_segment_survives() {
        let text = "<gpx><trk><trkseg/><trkseg></trkseg></trk></gpx>";
        let snapshot = decode(text).unwrap();
        assert_eq!(snapshot.segments.len(), 2);
        assert!(snapshot.segments.iter().all(TrackSegment::is_empty));
    }

    fn arb_time() -> impl Strategy<Value = Option<DateTime<Utc>>> {
        proptest::option::of(
            (0i64..4_000_000_000, 0u32..1_000_000_000)
                .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap()),
        )
    }

    fn arb_point() -> impl Strategy<Value = Trackpoint> {
        (
            -90.0f64..=90.0,
            -180.0f64..=180.0,
            proptest::option::of(-500.0f64..9000.0),
            proptest::option::of(0.0f64..500.0),
            arb_time(),
        )
            .prop_map(|(latitude, longitude, elevation, horizontal_accuracy, time)| {
                Trackpoint {
                    latitude,
                    longitude,
                    elevation,
                    horizontal_accuracy,
                    time,
                }
            })
    }

    fn arb_waypoint() -> impl Strategy<Value = Waypoint> {
        let text = "[a-zA-Z0-9 &<>'\"éß.,-]{0,20}";
        (
            -90.0f64..=90.0,
            -180.0f64..=180.0,
            proptest::option::of(-500.0f64..9000.0),
            proptest::option::of(text),
            proptest::option::of(text),
            arb_time(),
        )
            .prop_map(|(latitude, longitude, elevation, name, description, time)| Waypoint {
                latitude,
                longitude,
                elevation,
                name,
                description,
                time,
            })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            segments in proptest::collection::vec(
                proptest::collection::vec(arb_point(), 0..6).prop_map(TrackSegment::from),
                0..4,
            ),
            waypoints in proptest::collection::vec(arb_waypoint(), 0..4),
        ) {
            let snapshot = SessionSnapshot { segments, waypoints };
            let decoded = decode(&encode(&snapshot)).unwrap();
            prop_assert_eq!(decoded, snapshot);
        }
    }
}
