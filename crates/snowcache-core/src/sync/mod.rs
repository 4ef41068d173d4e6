//! Synchronization between the local cache and the backend.
//!
//! - `SyncOrchestrator`: cache-first hydration, prioritized background
//!   refresh, rate-limited manual refresh and fallback to cache on failure
//! - `PreferenceSyncQueue`: debounced, coalesced preference pushes
//! - `DataStatus` / `SyncBoard`: what the UI is told about each category

pub mod orchestrator;
pub mod preferences;
pub mod priority;
pub mod status;

use std::time::Duration;

pub use orchestrator::{CachedItem, HydrationSummary, SyncOrchestrator};
pub use preferences::{PreferenceFile, PreferenceSyncQueue};
pub use priority::prioritize_ids;
pub use status::{DataStatus, RefreshOutcome, RefreshTrigger, SyncBoard, SyncState};

/// Tuning for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Minimum gap between the end of one manual refresh and the start of the next
    pub manual_refresh_cooldown: Duration,
    /// Most resorts whose condition sets are fetched per refresh
    pub max_conditions_fetch: usize,
    /// Most resorts whose snow quality summaries are fetched per refresh
    pub max_snow_quality_fetch: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            manual_refresh_cooldown: Duration::from_secs(5),
            max_conditions_fetch: 60,
            max_snow_quality_fetch: 1000,
        }
    }
}
