//! Remote data source module for the resort conditions backend.
//!
//! This module provides the `RemoteDataSource` port, its `reqwest`-backed
//! implementation `HttpRemoteDataSource`, and the chunked batch helpers that
//! split large id lists into bounded requests with per-chunk failure
//! isolation.
//!
//! Requests carry a bearer token from the current `Session` when one exists.

pub mod batch;
pub mod client;
pub mod error;
pub mod remote;

pub use batch::{batch_stream, ChunkOutcome};
pub use client::HttpRemoteDataSource;
pub use error::ApiError;
pub use remote::{RemoteDataSource, CONDITIONS_CHUNK_SIZE, SNOW_QUALITY_CHUNK_SIZE};
