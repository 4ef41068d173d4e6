//! The assembled data layer against a mocked API.

use std::time::Duration;

use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snowcache_core::auth::Session;
use snowcache_core::cache::Category;
use snowcache_core::models::ElevationLevel;
use snowcache_core::sync::PreferenceFile;
use snowcache_core::{RefreshOutcome, RefreshTrigger};

use crate::common;

#[tokio::test]
async fn test_first_launch_syncs_and_second_launch_falls_back() {
    let dir = TempDir::new().unwrap();

    // First launch: empty cache, healthy backend
    let server = MockServer::start().await;
    common::mount_catalog(&server).await;
    let mut cache = common::snowcache(&server, dir.path(), common::signed_in());

    let (hydrated, outcome) = cache.launch();
    assert_eq!(hydrated.total(), 0);
    assert_eq!(outcome, RefreshOutcome::Started(vec![Category::Resort]));
    cache.run_until_idle().await;

    assert_eq!(cache.resorts().len(), 2);
    assert_eq!(
        cache
            .read_condition("vail", ElevationLevel::Top)
            .expect("vail top reading")
            .data
            .fresh_snow_cm,
        Some(14.0)
    );
    assert!(cache.read_snow_quality("aspen").is_some());
    let status = cache.status(Category::SnowQualitySummary);
    assert!(status.has_data);
    assert!(!status.is_using_cached_data);
    assert!(status.last_error_summary.is_none());
    cache.shutdown().await;

    // Second launch: backend is down
    let offline = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&offline)
        .await;
    let mut cache = common::snowcache(&offline, dir.path(), common::signed_in());

    let hydrated = cache.hydrate();
    assert_eq!(hydrated.resorts, 2);
    assert_eq!(hydrated.conditions, 2);
    assert!(cache.board().resorts.has_data);

    assert!(matches!(
        cache.refresh_all(RefreshTrigger::Manual),
        RefreshOutcome::Started(_)
    ));
    cache.run_until_idle().await;

    for category in Category::ALL {
        let status = cache.status(category);
        assert!(status.has_data, "{} lost its data", category);
        assert!(status.is_using_cached_data);
        assert!(!status.unable_to_load);
        assert_eq!(status.age_description.as_deref(), Some("just now"));
        assert_eq!(
            status.last_error_summary.as_deref(),
            Some("The server had a problem. Try again later.")
        );
    }
    assert_eq!(cache.read_resort("vail").expect("cached vail").data.name, "Vail");
    assert_eq!(cache.store_diagnostics().decode_failures, 0);
    cache.shutdown().await;
}

#[tokio::test]
async fn test_preference_burst_pushes_final_snapshot_once() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/user/preferences"))
        .and(body_json(serde_json::json!({
            "favoriteResortIds": ["aspen", "vail"],
            "hiddenRegions": [],
            "units": { "temperature": "celsius", "distance": "metric" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let cache = common::snowcache(&server, dir.path(), common::signed_in());

    for id in ["vail", "telluride", "aspen", "telluride"] {
        cache.mutate_preferences(|prefs| {
            prefs.toggle_favorite(id);
        });
    }
    // Local state is updated before any push
    assert!(cache.preferences().is_favorite("aspen"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    server.verify().await;
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(1));
    cache.shutdown().await;

    let saved = PreferenceFile::new(&dir.path().join("data"))
        .load()
        .expect("load saved preferences");
    assert!(saved.is_favorite("vail"));
    assert!(!saved.is_favorite("telluride"));
}

#[tokio::test]
async fn test_signed_out_mutations_stay_local() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    let signed_out = std::sync::Arc::new(Session::in_memory(None));
    let cache = common::snowcache(&server, dir.path(), signed_out);

    cache.mutate_preferences(|prefs| {
        prefs.hidden_regions.insert("Alps".to_string());
    });
    cache.shutdown().await;

    let saved = PreferenceFile::new(&dir.path().join("data"))
        .load()
        .expect("load saved preferences");
    assert!(saved.is_region_hidden(Some("Alps")));
}
