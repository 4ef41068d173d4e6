//! Application configuration management.
//!
//! This module handles loading and saving the data layer configuration:
//! the API base URL, request timeout, cache location, sync tuning and
//! optional staleness overrides.
//!
//! Configuration is stored at `~/.config/snowcache/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::cache::{Category, StalenessPolicy};
use crate::sync::SyncSettings;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "snowcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "https://api.snowcache.app/v1";

/// Per-category freshness overrides, in minutes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessOverrides {
    pub resort_minutes: Option<i64>,
    pub conditions_minutes: Option<i64>,
    pub snow_quality_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
    pub preference_debounce_ms: u64,
    pub manual_refresh_cooldown_secs: u64,
    pub max_conditions_fetch: usize,
    pub max_snow_quality_fetch: usize,
    pub staleness: StalenessOverrides,
}

impl Default for Config {
    fn default() -> Self {
        let sync = SyncSettings::default();
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_dir: None,
            preference_debounce_ms: 1000,
            manual_refresh_cooldown_secs: sync.manual_refresh_cooldown.as_secs(),
            max_conditions_fetch: sync.max_conditions_fetch,
            max_snow_quality_fetch: sync.max_snow_quality_fetch,
            staleness: StalenessOverrides::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where cache entries live
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Where preferences, the session and logs live
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.join("data"));
        }
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn preference_debounce(&self) -> Duration {
        Duration::from_millis(self.preference_debounce_ms)
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        let overrides = [
            (Category::Resort, self.staleness.resort_minutes),
            (Category::ConditionSet, self.staleness.conditions_minutes),
            (Category::SnowQualitySummary, self.staleness.snow_quality_minutes),
        ];
        overrides
            .into_iter()
            .fold(StalenessPolicy::default(), |policy, (category, minutes)| match minutes {
                Some(minutes) if minutes > 0 => {
                    policy.with_freshness(category, chrono::Duration::minutes(minutes))
                }
                _ => policy,
            })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            manual_refresh_cooldown: Duration::from_secs(self.manual_refresh_cooldown_secs),
            max_conditions_fetch: self.max_conditions_fetch,
            max_snow_quality_fetch: self.max_snow_quality_fetch,
        }
    }
}
