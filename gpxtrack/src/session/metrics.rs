//! Live distance metrics.

use super::model::{TrackSegment, Trackpoint};

/// Distance and size figures shown while recording.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionMetrics {
    /// Metres across all segments.
    pub total_distance: f64,
    /// Metres in the last segment.
    pub current_segment_distance: f64,
    pub point_count: usize,
    pub segment_count: usize,
}

impl SessionMetrics {
    /// Recomputes everything from scratch.
    pub fn from_segments(segments: &[TrackSegment]) -> Self {
        let distances: Vec<f64> = segments.iter().map(TrackSegment::distance).collect();
        Self {
            total_distance: distances.iter().sum(),
            current_segment_distance: distances.last().copied().unwrap_or(0.0),
            point_count: segments.iter().map(|s| s.points.len()).sum(),
            segment_count: segments.len(),
        }
    }

    /// Accounts for `point` appended after `previous` in the current segment.
    pub(crate) fn record_point(&mut self, previous: Option<&Trackpoint>, point: &Trackpoint) {
        let step = previous.map_or(0.0, |p| p.distance_to(point));
        self.total_distance += step;
        self.current_segment_distance += step;
        self.point_count += 1;
    }

    pub(crate) fn record_new_segment(&mut self) {
        self.segment_count += 1;
        self.current_segment_distance = 0.0;
    }

    pub(crate) fn record_dropped_empty_segment(&mut self, remaining: &[TrackSegment]) {
        self.segment_count = remaining.len();
        self.current_segment_distance = remaining.last().map_or(0.0, TrackSegment::distance);
    }
}
