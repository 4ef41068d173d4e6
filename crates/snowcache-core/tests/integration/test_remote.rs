//! HTTP data source against a mocked API.

use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use snowcache_core::api::{ApiError, HttpRemoteDataSource, RemoteDataSource};
use snowcache_core::models::{ElevationLevel, SnowQuality, UserPreferences};

use crate::common;

#[tokio::test]
async fn test_list_resorts_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::resorts_json()))
        .expect(1)
        .mount(&server)
        .await;

    let resorts = common::client(&server).list_resorts().await.expect("list_resorts failed");

    assert_eq!(resorts.len(), 2);
    assert_eq!(resorts[0].id, "vail");
    assert_eq!(resorts[1].name, "Aspen Snowmass");
    assert_eq!(resorts[0].region.as_deref(), Some("Colorado"));
}

#[tokio::test]
async fn test_batch_ids_are_comma_separated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conditions/batch"))
        .and(query_param("ids", "vail,aspen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::conditions_json()))
        .expect(1)
        .mount(&server)
        .await;

    let ids = vec!["vail".to_string(), "aspen".to_string()];
    let conditions = common::client(&server)
        .fetch_conditions(&ids)
        .await
        .expect("fetch_conditions failed");

    assert_eq!(conditions["vail"].len(), 2);
    assert_eq!(conditions["vail"][1].elevation, ElevationLevel::Top);
    assert_eq!(conditions["aspen"][0].temperature_c, Some(-6.0));
}

#[tokio::test]
async fn test_snow_quality_batch() {
    let server = MockServer::start().await;
    common::mount_catalog(&server).await;

    let ids = vec!["vail".to_string(), "aspen".to_string()];
    let summaries = common::client(&server)
        .fetch_snow_quality(&ids)
        .await
        .expect("fetch_snow_quality failed");

    assert_eq!(summaries["vail"].overall_quality, SnowQuality::Excellent);
    assert_eq!(summaries["aspen"].score, Some(7.4));
}

#[tokio::test]
async fn test_empty_batch_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let summaries = common::client(&server)
        .fetch_snow_quality(&[])
        .await
        .expect("empty batch failed");
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn test_unauthorized_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let err = common::client(&server).list_resorts().await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
}

#[tokio::test]
async fn test_server_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = common::client(&server).list_resorts().await.unwrap_err();
    assert_eq!(err, ApiError::ServerError(500));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"resorts\": oops"))
        .mount(&server)
        .await;

    let err = common::client(&server).list_resorts().await.unwrap_err();
    assert!(matches!(err, ApiError::DecodeError(_)));
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::resorts_json()))
        .expect(1)
        .mount(&server)
        .await;

    let resorts = common::client(&server).list_resorts().await.expect("retry failed");
    assert_eq!(resorts.len(), 2);
}

#[tokio::test]
async fn test_rate_limit_gives_up_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resorts"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let err = common::client(&server).list_resorts().await.unwrap_err();
    assert_eq!(err, ApiError::ServerError(429));
}

#[tokio::test]
async fn test_unreachable_server_is_no_connection() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = HttpRemoteDataSource::new(uri, Duration::from_secs(2)).expect("build client");
    let err = client.list_resorts().await.unwrap_err();
    assert!(matches!(err, ApiError::NoConnection(_)));
}

#[tokio::test]
async fn test_push_preferences_sends_full_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/user/preferences"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(serde_json::json!({
            "favoriteResortIds": ["whistler"],
            "hiddenRegions": ["Alps"],
            "units": { "temperature": "celsius", "distance": "metric" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut prefs = UserPreferences::default();
    prefs.toggle_favorite("whistler");
    prefs.hidden_regions.insert("Alps".to_string());

    common::client(&server)
        .push_preferences(&prefs)
        .await
        .expect("push_preferences failed");
}
