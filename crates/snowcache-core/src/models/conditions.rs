use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mountain elevation band a reading was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationLevel {
    Base,
    Mid,
    Top,
}

impl ElevationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElevationLevel::Base => "base",
            ElevationLevel::Mid => "mid",
            ElevationLevel::Top => "top",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Some(ElevationLevel::Base),
            "mid" => Some(ElevationLevel::Mid),
            "top" => Some(ElevationLevel::Top),
            _ => None,
        }
    }
}

impl fmt::Display for ElevationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weather reading for one resort at one elevation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    #[serde(rename = "resortId")]
    pub resort_id: String,
    #[serde(rename = "elevationLevel")]
    pub elevation: ElevationLevel,
    #[serde(rename = "temperatureC", default)]
    pub temperature_c: Option<f64>,
    #[serde(rename = "snowDepthCm", default)]
    pub snow_depth_cm: Option<f64>,
    #[serde(rename = "freshSnowCm", default)]
    pub fresh_snow_cm: Option<f64>,
    #[serde(rename = "windSpeedKmh", default)]
    pub wind_speed_kmh: Option<f64>,
    #[serde(rename = "observedAt", default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Split a condition key (`"whistler"` or `"whistler:top"`) into the resort
/// id and the elevation level. A suffix that is not an elevation level is
/// treated as part of the resort id.
pub fn split_condition_key(key: &str) -> (&str, Option<ElevationLevel>) {
    match key.rsplit_once(':') {
        Some((resort_id, suffix)) => match ElevationLevel::parse(suffix) {
            Some(level) => (resort_id, Some(level)),
            None => (key, None),
        },
        None => (key, None),
    }
}
