use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Entity category. Each category is its own logical table in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Resort,
    ConditionSet,
    SnowQualitySummary,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Resort,
        Category::ConditionSet,
        Category::SnowQualitySummary,
    ];

    /// Directory name used for the category's table on disk
    pub fn table_name(&self) -> &'static str {
        match self {
            Category::Resort => "resorts",
            Category::ConditionSet => "conditions",
            Category::SnowQualitySummary => "snow_quality",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Resort => "Resorts",
            Category::ConditionSet => "Conditions",
            Category::SnowQualitySummary => "Snow quality",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Freshness and hard-expiry windows for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    /// Past this age an entry is reported stale but still returned.
    pub freshness: Duration,
    /// Past this age an entry may be deleted by the cleanup sweep.
    pub hard_expiry: Duration,
}

/// Lookup table mapping a category to its windows.
///
/// Consulted only at read time and by the cleanup sweep. Nothing is persisted
/// from it, so changing a window applies to existing entries immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalenessPolicy {
    windows: HashMap<Category, Windows>,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        let hard_expiry = Duration::days(7);
        let windows = HashMap::from([
            (
                Category::Resort,
                Windows {
                    freshness: Duration::hours(24),
                    hard_expiry,
                },
            ),
            (
                Category::ConditionSet,
                Windows {
                    freshness: Duration::minutes(30),
                    hard_expiry,
                },
            ),
            (
                Category::SnowQualitySummary,
                Windows {
                    freshness: Duration::hours(1),
                    hard_expiry,
                },
            ),
        ]);
        Self { windows }
    }
}

impl StalenessPolicy {
    pub fn windows(&self, category: Category) -> Windows {
        self.windows
            .get(&category)
            .copied()
            .unwrap_or_else(|| StalenessPolicy::default().windows[&category])
    }

    pub fn freshness_window(&self, category: Category) -> Duration {
        self.windows(category).freshness
    }

    pub fn hard_expiry_window(&self, category: Category) -> Duration {
        self.windows(category).hard_expiry
    }

    /// Whether data of this category and age should be reported stale
    pub fn is_stale(&self, category: Category, age: Duration) -> bool {
        age > self.freshness_window(category)
    }

    /// Replace the windows for a single category
    pub fn with_windows(mut self, category: Category, windows: Windows) -> Self {
        self.windows.insert(category, windows);
        self
    }

    pub fn with_freshness(self, category: Category, freshness: Duration) -> Self {
        let hard_expiry = self.hard_expiry_window(category);
        self.with_windows(
            category,
            Windows {
                freshness,
                hard_expiry,
            },
        )
    }
}
