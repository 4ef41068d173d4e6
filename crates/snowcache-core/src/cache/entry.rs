use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format_age;

/// Version of the on-disk envelope. Entries written with any other version
/// are treated as cache misses.
pub const SCHEMA_VERSION: u32 = 1;

/// One persisted row: a payload plus the time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub schema_version: u32,
    pub key: String,
    pub cached_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, payload: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            key: key.into(),
            cached_at,
            payload,
        }
    }
}

/// A read result. `is_stale` is derived at read time and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedView<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    pub is_stale: bool,
}

impl<T> CachedView<T> {
    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        format_age(now - self.cached_at)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CachedView<U> {
        CachedView {
            data: f(self.data),
            cached_at: self.cached_at,
            is_stale: self.is_stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_entry_carries_current_schema() {
        let entry = CacheEntry::new("vail", 3, Utc::now());
        assert_eq!(entry.schema_version, SCHEMA_VERSION);
        assert_eq!(entry.key, "vail");
    }

    #[test]
    fn test_view_age_display() {
        let now = Utc::now();
        let view = CachedView {
            data: (),
            cached_at: now - Duration::minutes(12),
            is_stale: false,
        };
        assert_eq!(view.age_display(now), "~12m ago");
    }
}
