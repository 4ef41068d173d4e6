//! Authentication state for the data layer.
//!
//! This module provides `Session`, which holds the bearer token used by the
//! remote data source and tells the preference queue whether a push may be
//! attempted. Obtaining the token is the job of the host application; the
//! session only stores it and checks its expiry.
//!
//! Sessions are persisted to disk next to the cache.

pub mod session;

pub use session::{Session, SessionData};
