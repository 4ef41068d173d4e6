//! Local caching module for offline data access.
//!
//! This module provides the `PersistentStore` for storing and retrieving
//! resort data locally, and the `StalenessPolicy` that decides at read time
//! whether a cached entry is still fresh.
//!
//! Cached categories:
//! - Resorts (fresh for 24h)
//! - Condition sets (fresh for 30 minutes)
//! - Snow quality summaries (fresh for 1h)
//!
//! Every category is hard-expired after 7 days by the cleanup sweep.

pub mod entry;
pub mod policy;
pub mod store;

pub use entry::{CacheEntry, CachedView, SCHEMA_VERSION};
pub use policy::{Category, StalenessPolicy, Windows};
pub use store::{PersistentStore, StoreDiagnostics};
