//! User preferences mirrored to the backend as a full snapshot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UnitPreferences {
    pub temperature: TemperatureUnit,
    pub distance: DistanceUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserPreferences {
    #[serde(rename = "favoriteResortIds", default)]
    pub favorite_resort_ids: BTreeSet<String>,
    #[serde(rename = "hiddenRegions", default)]
    pub hidden_regions: BTreeSet<String>,
    #[serde(default)]
    pub units: UnitPreferences,
}

impl UserPreferences {
    pub fn is_favorite(&self, resort_id: &str) -> bool {
        self.favorite_resort_ids.contains(resort_id)
    }

    /// Toggle a favorite, returning whether it is now a favorite
    pub fn toggle_favorite(&mut self, resort_id: &str) -> bool {
        if self.favorite_resort_ids.remove(resort_id) {
            false
        } else {
            self.favorite_resort_ids.insert(resort_id.to_string());
            true
        }
    }

    pub fn is_region_hidden(&self, region: Option<&str>) -> bool {
        match region {
            Some(region) => self
                .hidden_regions
                .iter()
                .any(|hidden| hidden.eq_ignore_ascii_case(region)),
            None => false,
        }
    }
}
