use std::fmt;

use serde::{Deserialize, Serialize};

/// Quality bucket computed server-side. Unrecognized values decode as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnowQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Bad,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SnowQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnowQuality::Excellent => write!(f, "Excellent"),
            SnowQuality::Good => write!(f, "Good"),
            SnowQuality::Fair => write!(f, "Fair"),
            SnowQuality::Poor => write!(f, "Poor"),
            SnowQuality::Bad => write!(f, "Bad"),
            SnowQuality::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnowQualitySummary {
    #[serde(rename = "resortId")]
    pub resort_id: String,
    #[serde(rename = "overallQuality")]
    pub overall_quality: SnowQuality,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(rename = "freshSnowCm", default)]
    pub fresh_snow_cm: Option<f64>,
}
