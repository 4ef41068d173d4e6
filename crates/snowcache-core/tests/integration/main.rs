//! Integration tests for snowcache-core
//!
//! Uses wiremock to simulate the resort conditions API and verifies the
//! HTTP data source and the assembled data layer end to end.

mod common;

mod test_remote;
mod test_snowcache;
