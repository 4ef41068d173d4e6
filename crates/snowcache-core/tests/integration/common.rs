//! Shared helpers for integration tests.
//!
//! Mounts the resort API endpoints on a wiremock server and builds clients
//! and data layers pointing at it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snowcache_core::api::{HttpRemoteDataSource, RemoteDataSource};
use snowcache_core::auth::{Session, SessionData};
use snowcache_core::cache::PersistentStore;
use snowcache_core::sync::PreferenceFile;
use snowcache_core::{Config, SnowCache};

pub const TOKEN: &str = "test-token";

pub fn signed_in() -> Arc<Session> {
    Arc::new(Session::in_memory(Some(SessionData::new(TOKEN))))
}

/// Client for `server` with a fast 429 backoff
pub fn client(server: &MockServer) -> HttpRemoteDataSource {
    HttpRemoteDataSource::new(server.uri(), Duration::from_secs(5))
        .expect("build client")
        .with_session(signed_in())
        .with_initial_backoff(Duration::from_millis(10))
}

pub fn resorts_json() -> serde_json::Value {
    serde_json::json!([
        { "resortId": "vail", "name": "Vail", "region": "Colorado", "country": "US" },
        { "resortId": "aspen", "name": "Aspen Snowmass", "region": "Colorado", "country": "US" }
    ])
}

pub fn conditions_json() -> serde_json::Value {
    serde_json::json!({
        "vail": [
            { "resortId": "vail", "elevationLevel": "base", "temperatureC": -3.0, "snowDepthCm": 90.0 },
            { "resortId": "vail", "elevationLevel": "top", "temperatureC": -9.5, "freshSnowCm": 14.0 }
        ],
        "aspen": [
            { "resortId": "aspen", "elevationLevel": "mid", "temperatureC": -6.0 }
        ]
    })
}

pub fn snow_quality_json() -> serde_json::Value {
    serde_json::json!({
        "vail": { "resortId": "vail", "overallQuality": "excellent", "score": 9.1, "freshSnowCm": 14.0 },
        "aspen": { "resortId": "aspen", "overallQuality": "good", "score": 7.4 }
    })
}

/// Mount all three read endpoints with healthy responses
pub async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(resorts_json()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/conditions/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conditions_json()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/snow-quality/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(snow_quality_json()))
        .mount(server)
        .await;
}

/// A data layer rooted in `dir` talking to `server`
pub fn snowcache(server: &MockServer, dir: &Path, session: Arc<Session>) -> SnowCache {
    let config = Config {
        api_base_url: server.uri(),
        cache_dir: Some(dir.to_path_buf()),
        preference_debounce_ms: 50,
        ..Config::default()
    };
    let store = PersistentStore::new(config.cache_dir().expect("cache dir"))
        .expect("open store")
        .with_policy(config.staleness_policy());
    let remote = HttpRemoteDataSource::new(config.api_base_url.clone(), config.request_timeout())
        .expect("build client")
        .with_session(Arc::clone(&session));
    let preference_file = PreferenceFile::new(&config.data_dir().expect("data dir"));

    SnowCache::with_parts(
        config,
        Arc::new(store),
        session,
        Arc::new(remote) as Arc<dyn RemoteDataSource>,
        Some(preference_file),
    )
}
