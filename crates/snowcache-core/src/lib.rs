//! Core library for snowcache.
//!
//! An offline-first cache and sync engine for ski resort data: a persistent,
//! staleness-aware store, an orchestrator that hydrates from cache and
//! refreshes in the background, and a debounced queue mirroring user
//! preferences to the backend.
//!
//! [`SnowCache`] wires the pieces together and is the surface UI code uses.

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod models;
pub mod sync;
pub mod utils;

pub use api::ApiError;
pub use cache::{CachedView, Category};
pub use config::Config;
pub use context::SnowCache;
pub use sync::{DataStatus, RefreshOutcome, RefreshTrigger, SyncBoard};
