use std::time::Duration;

use serde::Serialize;

use crate::cache::Category;

/// What started a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// App start, tab switch, timers. Skips data that is still fresh.
    Automatic,
    /// Pull-to-refresh or a refresh button. Subject to the cooldown.
    Manual,
}

/// Per-category network state. Only used to collapse concurrent refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Loading,
    Done {
        /// The last run failed at least partly and cached data filled in
        from_cache: bool,
    },
}

/// Result of asking for a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Started(Vec<Category>),
    /// Every requested category already had a fetch running
    AlreadyInFlight,
    /// Rejected because the previous manual refresh finished too recently
    RateLimited { retry_after: Duration },
    /// Automatic refresh with nothing stale to fetch
    UpToDate,
}

/// Everything the UI is told about one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct DataStatus {
    pub has_data: bool,
    pub is_stale: bool,
    pub is_using_cached_data: bool,
    /// Nothing cached and the last fetch failed
    pub unable_to_load: bool,
    pub age_description: Option<String>,
    pub last_error_summary: Option<String>,
}

/// Snapshot of every category's status, published on each change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SyncBoard {
    pub revision: u64,
    pub resorts: DataStatus,
    pub conditions: DataStatus,
    pub snow_quality: DataStatus,
}

impl SyncBoard {
    pub fn get(&self, category: Category) -> &DataStatus {
        match category {
            Category::Resort => &self.resorts,
            Category::ConditionSet => &self.conditions,
            Category::SnowQualitySummary => &self.snow_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_get_by_category() {
        let board = SyncBoard {
            revision: 3,
            conditions: DataStatus {
                has_data: true,
                ..DataStatus::default()
            },
            ..SyncBoard::default()
        };
        assert!(board.get(Category::ConditionSet).has_data);
        assert!(!board.get(Category::Resort).has_data);
        assert!(!board.get(Category::SnowQualitySummary).has_data);
    }
}
