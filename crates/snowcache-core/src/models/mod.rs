//! Data models for resort conditions entities.
//!
//! - `Resort`: near-static reference data for a ski resort
//! - `WeatherCondition`, `ElevationLevel`: per-elevation readings making up a condition set
//! - `SnowQualitySummary`: lightweight server-computed quality score per resort
//! - `UserPreferences`: favorites, hidden regions and display units

pub mod conditions;
pub mod preferences;
pub mod resort;
pub mod snow_quality;

pub use conditions::{split_condition_key, ElevationLevel, WeatherCondition};
pub use preferences::{DistanceUnit, TemperatureUnit, UnitPreferences, UserPreferences};
pub use resort::Resort;
pub use snow_quality::{SnowQuality, SnowQualitySummary};
