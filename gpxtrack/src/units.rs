//! Unit preferences and display formatting for distances, speeds and GPS
//! accuracy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Metres in one foot.
const METERS_PER_FOOT: f64 = 0.3048;
/// Metres in one statute mile.
const METERS_PER_MILE: f64 = 1609.344;
/// Below this distance imperial output switches from miles to feet.
const IMPERIAL_FEET_THRESHOLD_M: f64 = 0.1 * METERS_PER_MILE;

/// Placeholder shown when speed is unknown.
pub const UNKNOWN_SPEED: &str = "·.··";
/// Placeholder shown when accuracy is unknown.
pub const UNKNOWN_ACCURACY: &str = "±···";

/// Measurement system used for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            other => Err(format!(
                "invalid units '{}', expected 'metric' or 'imperial'",
                other
            )),
        }
    }
}

/// Formats a distance in metres.
///
/// Metric shows whole metres below one kilometre; imperial shows whole feet
/// below a tenth of a mile.
pub fn format_distance(meters: f64, units: Units) -> String {
    match units {
        Units::Metric if meters < 1000.0 => format!("{:.0}m", meters),
        Units::Metric => format!("{:.2}km", meters / 1000.0),
        Units::Imperial if meters < IMPERIAL_FEET_THRESHOLD_M => {
            format!("{:.0}ft", meters / METERS_PER_FOOT)
        }
        Units::Imperial => format!("{:.2}mi", meters / METERS_PER_MILE),
    }
}

/// Formats a speed given in metres per second. Negative or missing speeds
/// (the receiver could not determine one) render as a placeholder.
pub fn format_speed(meters_per_second: Option<f64>, units: Units) -> String {
    match meters_per_second {
        Some(mps) if mps >= 0.0 => match units {
            Units::Metric => format!("{:.2}km/h", mps * 3.6),
            Units::Imperial => format!("{:.2}mph", mps * 3600.0 / METERS_PER_MILE),
        },
        _ => format!(
            "{}{}",
            UNKNOWN_SPEED,
            match units {
                Units::Metric => "km/h",
                Units::Imperial => "mph",
            }
        ),
    }
}

pub fn format_altitude(meters: f64, units: Units) -> String {
    match units {
        Units::Metric => format!("{:.0}m", meters),
        Units::Imperial => format!("{:.0}ft", meters / METERS_PER_FOOT),
    }
}

/// Formats horizontal accuracy (radius in metres).
pub fn format_accuracy(meters: Option<f64>, units: Units) -> String {
    match meters {
        Some(m) if m >= 0.0 => match units {
            Units::Metric => format!("±{:.0}m", m),
            Units::Imperial => format!("±{:.0}ft", m / METERS_PER_FOOT),
        },
        _ => UNKNOWN_ACCURACY.to_string(),
    }
}

/// GPS signal strength derived from horizontal accuracy, 0 (none) to 6
/// (excellent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalQuality(u8);

impl SignalQuality {
    pub const MAX: SignalQuality = SignalQuality(6);

    /// Upper accuracy bounds in metres, best first.
    const THRESHOLDS: [f64; 6] = [6.0, 11.0, 31.0, 51.0, 101.0, 201.0];

    pub fn from_accuracy(horizontal_accuracy: Option<f64>) -> Self {
        let Some(accuracy) = horizontal_accuracy.filter(|a| *a >= 0.0) else {
            return SignalQuality(0);
        };
        let better_than = Self::THRESHOLDS
            .iter()
            .position(|limit| accuracy < *limit)
            .unwrap_or(Self::THRESHOLDS.len());
        SignalQuality((Self::THRESHOLDS.len() - better_than) as u8)
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_distance() {
        assert_eq!(format_distance(0.0, Units::Metric), "0m");
        assert_eq!(format_distance(999.4, Units::Metric), "999m");
        assert_eq!(format_distance(1000.0, Units::Metric), "1.00km");
        assert_eq!(format_distance(12_346.0, Units::Metric), "12.35km");
    }

    #[test]
    fn test_imperial_distance() {
        assert_eq!(format_distance(100.0, Units::Imperial), "328ft");
        assert_eq!(format_distance(1609.344, Units::Imperial), "1.00mi");
    }

    #[test]
    fn test_speed() {
        assert_eq!(format_speed(Some(10.0), Units::Metric), "36.00km/h");
        assert_eq!(format_speed(Some(-1.0), Units::Metric), "·.··km/h");
        assert_eq!(format_speed(None, Units::Imperial), "·.··mph");
        assert_eq!(format_speed(Some(0.44704), Units::Imperial), "1.00mph");
    }

    #[test]
    fn test_altitude_and_accuracy() {
        assert_eq!(format_altitude(100.0, Units::Metric), "100m");
        assert_eq!(format_altitude(100.0, Units::Imperial), "328ft");
        assert_eq!(format_accuracy(Some(5.0), Units::Metric), "±5m");
        assert_eq!(format_accuracy(None, Units::Metric), UNKNOWN_ACCURACY);
        assert_eq!(format_accuracy(Some(-1.0), Units::Imperial), UNKNOWN_ACCURACY);
    }

    #[test]
    fn test_signal_quality_thresholds() {
        let level = |a| SignalQuality::from_accuracy(a).level();
        assert_eq!(level(Some(3.0)), 6);
        assert_eq!(level(Some(6.0)), 5);
        assert_eq!(level(Some(20.0)), 4);
        assert_eq!(level(Some(50.0)), 3);
        assert_eq!(level(Some(100.0)), 2);
        assert_eq!(level(Some(200.0)), 1);
        assert_eq!(level(Some(201.0)), 0);
        assert_eq!(level(None), 0);
        assert_eq!(level(Some(-5.0)), 0);
    }

    #[test]
    fn test_units_parse() {
        assert_eq!("Imperial".parse::<Units>(), Ok(Units::Imperial));
        assert!("furlongs".parse::<Units>().is_err());
    }
}
