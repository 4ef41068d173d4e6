//! HTTP implementation of the remote data source.
//!
//! This module provides `HttpRemoteDataSource`, which talks to the resort
//! conditions REST API with `reqwest`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::remote::RemoteDataSource;
use super::ApiError;
use crate::auth::Session;
use crate::models::{Resort, SnowQualitySummary, UserPreferences, WeatherCondition};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
/// Long enough for a 200-id summary batch on a slow mobile link.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Remote data source backed by the REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpRemoteDataSource {
    client: Client,
    base_url: String,
    session: Option<Arc<Session>>,
    initial_backoff: Duration,
}

impl HttpRemoteDataSource {
    /// Create a client for the API rooted at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::NoConnection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Attach the session whose token authenticates requests
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Override the first 429 backoff delay
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.as_ref().and_then(|s| s.token()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, retrying on 429 with exponential backoff.
    async fn send<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .authorize(build())
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(
                    url = %response.url(),
                    retry = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }

            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            debug!(url = %url, status = status.as_u16(), body = %ApiError::truncate_body(&body), "Request failed");
            return Err(ApiError::from_status(status));
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.send(|| self.client.get(&url).query(query)).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RemoteDataSource for HttpRemoteDataSource {
    async fn list_resorts(&self) -> Result<Vec<Resort>, ApiError> {
        let resorts: Vec<Resort> = self.get_json("/resorts", &[]).await?;
        debug!(count = resorts.len(), "Resorts fetched");
        Ok(resorts)
    }

    async fn fetch_conditions(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<WeatherCondition>>, ApiError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conditions: HashMap<String, Vec<WeatherCondition>> = self
            .get_json("/conditions/batch", &[("ids", ids.join(","))])
            .await?;
        debug!(requested = ids.len(), returned = conditions.len(), "Conditions fetched");
        Ok(conditions)
    }

    async fn fetch_snow_quality(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, SnowQualitySummary>, ApiError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let summaries: HashMap<String, SnowQualitySummary> = self
            .get_json("/snow-quality/batch", &[("ids", ids.join(","))])
            .await?;
        debug!(requested = ids.len(), returned = summaries.len(), "Snow quality fetched");
        Ok(summaries)
    }

    async fn push_preferences(&self, snapshot: &UserPreferences) -> Result<(), ApiError> {
        let url = self.url("/user/preferences");
        self.send(|| self.client.put(&url).json(snapshot)).await?;
        debug!(favorites = snapshot.favorite_resort_ids.len(), "Preferences pushed");
        Ok(())
    }
}
