//! Application context: the one place the data layer is assembled.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{HttpRemoteDataSource, RemoteDataSource};
use crate::auth::Session;
use crate::cache::{CachedView, Category, PersistentStore, StoreDiagnostics};
use crate::config::Config;
use crate::models::{ElevationLevel, Resort, SnowQualitySummary, UserPreferences, WeatherCondition};
use crate::sync::{
    CachedItem, DataStatus, HydrationSummary, PreferenceFile, PreferenceSyncQueue, RefreshOutcome,
    RefreshTrigger, SyncBoard, SyncOrchestrator,
};

/// Owns the store, session, remote, orchestrator and preference queue.
pub struct SnowCache {
    config: Config,
    store: Arc<PersistentStore>,
    session: Arc<Session>,
    preferences: PreferenceSyncQueue,
    orchestrator: SyncOrchestrator,
}

impl SnowCache {
    /// Build the data layer described by `config`, restoring the saved
    /// session and preferences. Must be called inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let store = PersistentStore::new(config.cache_dir()?)?.with_policy(config.staleness_policy());

        let session = Arc::new(Session::new(data_dir.clone()));
        match session.load() {
            Ok(true) => info!("Restored session"),
            Ok(false) => info!("No saved session, running signed out"),
            Err(e) => warn!(error = %e, "Failed to load session"),
        }

        let remote = HttpRemoteDataSource::new(config.api_base_url.clone(), config.request_timeout())
            .context("Failed to create API client")?
            .with_session(Arc::clone(&session));

        Ok(Self::with_parts(
            config,
            Arc::new(store),
            session,
            Arc::new(remote),
            Some(PreferenceFile::new(&data_dir)),
        ))
    }

    /// Assemble from parts built elsewhere. Must be called inside a tokio
    /// runtime.
    pub fn with_parts(
        config: Config,
        store: Arc<PersistentStore>,
        session: Arc<Session>,
        remote: Arc<dyn RemoteDataSource>,
        preference_file: Option<PreferenceFile>,
    ) -> Self {
        let initial = preference_file
            .as_ref()
            .map(PreferenceFile::load_or_default)
            .unwrap_or_default();
        let mut preferences = PreferenceSyncQueue::new(
            initial,
            Arc::clone(&remote),
            Arc::clone(&session),
            config.preference_debounce(),
        );
        if let Some(file) = preference_file {
            preferences = preferences.with_file(file);
        }

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            remote,
            preferences.subscribe(),
            config.sync_settings(),
        );

        Self {
            config,
            store,
            session,
            preferences,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn store_diagnostics(&self) -> StoreDiagnostics {
        self.store.diagnostics()
    }

    // ===== Sync =====

    /// Show whatever is cached. No network.
    pub fn hydrate(&mut self) -> HydrationSummary {
        self.orchestrator.hydrate()
    }

    /// App start: show the cache, then refresh whatever is stale in the
    /// background.
    pub fn launch(&mut self) -> (HydrationSummary, RefreshOutcome) {
        let hydrated = self.orchestrator.hydrate();
        let outcome = self.orchestrator.refresh_all(RefreshTrigger::Automatic);
        (hydrated, outcome)
    }

    pub fn refresh(&mut self, category: Category, trigger: RefreshTrigger) -> RefreshOutcome {
        self.orchestrator.refresh(category, trigger)
    }

    pub fn refresh_all(&mut self, trigger: RefreshTrigger) -> RefreshOutcome {
        self.orchestrator.refresh_all(trigger)
    }

    /// Apply background results that have arrived. Call from the UI loop.
    pub fn process_pending(&mut self) -> usize {
        self.orchestrator.process_pending()
    }

    /// Apply background results until every refresh has finished.
    pub async fn run_until_idle(&mut self) {
        self.orchestrator.run_until_idle().await
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncBoard> {
        self.orchestrator.subscribe()
    }

    pub fn board(&self) -> SyncBoard {
        self.orchestrator.board()
    }

    pub fn status(&self, category: Category) -> DataStatus {
        self.orchestrator.status(category)
    }

    // ===== Reads =====

    pub fn read(&self, category: Category, key: &str) -> Option<CachedView<CachedItem>> {
        self.orchestrator.read(category, key)
    }

    pub fn read_resort(&self, id: &str) -> Option<CachedView<Resort>> {
        self.orchestrator.read_resort(id)
    }

    pub fn read_conditions(&self, resort_id: &str) -> Option<CachedView<Vec<WeatherCondition>>> {
        self.orchestrator.read_conditions(resort_id)
    }

    pub fn read_condition(
        &self,
        resort_id: &str,
        level: ElevationLevel,
    ) -> Option<CachedView<WeatherCondition>> {
        self.orchestrator.read_condition(resort_id, level)
    }

    pub fn read_snow_quality(&self, resort_id: &str) -> Option<CachedView<SnowQualitySummary>> {
        self.orchestrator.read_snow_quality(resort_id)
    }

    /// Known resorts, favorites first
    pub fn resorts(&self) -> Vec<Resort> {
        self.orchestrator.resorts()
    }

    // ===== Preferences =====

    pub fn preferences(&self) -> UserPreferences {
        self.preferences.snapshot()
    }

    /// Apply a preference change locally and schedule the backend push.
    pub fn mutate_preferences<F>(&self, mutation: F) -> UserPreferences
    where
        F: FnOnce(&mut UserPreferences),
    {
        self.preferences.enqueue(mutation)
    }

    // ===== Maintenance =====

    pub fn clear_cache(&mut self) -> Result<()> {
        self.orchestrator.clear_cache()
    }

    /// Remove entries past their hard-expiry window. Returns how many.
    pub fn cleanup(&self) -> usize {
        self.store.cleanup_expired()
    }

    /// Flush any pending preference push and stop background work.
    pub async fn shutdown(self) {
        self.preferences.shutdown().await;
        info!("Data layer shut down");
    }
}
