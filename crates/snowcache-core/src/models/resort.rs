use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resort {
    #[serde(rename = "resortId", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(rename = "baseElevationM", default)]
    pub base_elevation_m: Option<i32>,
    #[serde(rename = "topElevationM", default)]
    pub top_elevation_m: Option<i32>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Resort {
    /// Vertical drop in metres, if both elevations are known
    pub fn vertical_drop_m(&self) -> Option<i32> {
        match (self.base_elevation_m, self.top_elevation_m) {
            (Some(base), Some(top)) if top >= base => Some(top - base),
            _ => None,
        }
    }

    pub fn is_in_region(&self, region: &str) -> bool {
        self.region
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case(region))
            .unwrap_or(false)
    }
}
