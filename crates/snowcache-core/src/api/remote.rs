use std::collections::HashMap;

use async_trait::async_trait;

use super::ApiError;
use crate::models::{Resort, SnowQualitySummary, UserPreferences, WeatherCondition};

/// Most ids per `GET /conditions/batch` request. Condition sets are large.
pub const CONDITIONS_CHUNK_SIZE: usize = 20;

/// Most ids per `GET /snow-quality/batch` request. Summaries are small.
pub const SNOW_QUALITY_CHUNK_SIZE: usize = 200;

/// The backend endpoints the sync engine consumes.
///
/// Batch methods issue exactly one request for the ids given; splitting a
/// large id list into chunks is the job of [`super::batch`].
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// `GET /resorts`. Fails as a whole; there is no partial result.
    async fn list_resorts(&self) -> Result<Vec<Resort>, ApiError>;

    /// `GET /conditions/batch?ids=...`, keyed by resort id.
    async fn fetch_conditions(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<WeatherCondition>>, ApiError>;

    /// `GET /snow-quality/batch?ids=...`, keyed by resort id.
    async fn fetch_snow_quality(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, SnowQualitySummary>, ApiError>;

    /// `PUT /user/preferences` with the full snapshot. Idempotent.
    async fn push_preferences(&self, snapshot: &UserPreferences) -> Result<(), ApiError>;
}
