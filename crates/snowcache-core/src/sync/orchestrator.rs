//! Cache-first refresh orchestration.
//!
//! `SyncOrchestrator` owns the in-memory view of every category. Background
//! fetch tasks never touch that view: they send `SyncMessage`s over a
//! channel and the owner applies them in `process_pending` or
//! `run_until_idle`, so all state has a single writer.
//!
//! Applying a message writes the store first, then merges into memory, then
//! publishes a fresh `SyncBoard` to subscribers.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::priority::prioritize_ids;
use super::status::{DataStatus, RefreshOutcome, RefreshTrigger, SyncBoard, SyncState};
use super::SyncSettings;
use crate::api::{
    batch_stream, ApiError, ChunkOutcome, RemoteDataSource, CONDITIONS_CHUNK_SIZE,
    SNOW_QUALITY_CHUNK_SIZE,
};
use crate::cache::{CachedView, Category, PersistentStore, StalenessPolicy};
use crate::models::{
    split_condition_key, ElevationLevel, Resort, SnowQualitySummary, UserPreferences,
    WeatherCondition,
};
use crate::utils::format_age;

/// Channel buffer size for background task results
const CHANNEL_BUFFER_SIZE: usize = 64;

// ============================================================================
// Background Task Messages
// ============================================================================

/// Sent from background fetch tasks to the orchestrator.
#[derive(Debug)]
enum SyncMessage {
    /// Full resort list fetched
    Resorts {
        resorts: Vec<Resort>,
        fetched_at: DateTime<Utc>,
    },
    /// One chunk of condition sets fetched, keyed by resort id
    Conditions {
        entries: HashMap<String, Vec<WeatherCondition>>,
        fetched_at: DateTime<Utc>,
    },
    /// One chunk of snow quality summaries fetched, keyed by resort id
    SnowQuality {
        entries: HashMap<String, SnowQualitySummary>,
        fetched_at: DateTime<Utc>,
    },
    /// Ids a chunk did not deliver: omitted by the server, or the whole
    /// chunk failed with `error`
    Unresolved {
        category: Category,
        ids: Vec<String>,
        error: Option<ApiError>,
    },
    /// A whole-category fetch failed
    Failed { category: Category, error: ApiError },
    /// No more messages will follow for this run of the category
    Finished { category: Category },
}

async fn send_message(tx: &mpsc::Sender<SyncMessage>, message: SyncMessage) {
    if let Err(e) = tx.send(message).await {
        error!(error = %e, "Failed to send sync message - channel closed");
    }
}

// ============================================================================
// Per-category state
// ============================================================================

#[derive(Debug, Clone)]
struct Stamped<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

struct CategoryState<T> {
    category: Category,
    items: HashMap<String, Stamped<T>>,
    sync: SyncState,
    using_cached_data: bool,
    /// Some part of the current run failed
    run_failed: bool,
    last_error: Option<ApiError>,
    /// Ids the latest run asked for. `None` means every held item counts.
    targeted: Option<HashSet<String>>,
}

impl<T> CategoryState<T> {
    fn new(category: Category) -> Self {
        Self {
            category,
            items: HashMap::new(),
            sync: SyncState::Idle,
            using_cached_data: false,
            run_failed: false,
            last_error: None,
            targeted: None,
        }
    }

    /// Merge freshly fetched values. A value older than the one held is
    /// ignored. Returns the accepted keys.
    fn apply_fresh(&mut self, entries: HashMap<String, T>, fetched_at: DateTime<Utc>) -> Vec<String> {
        let mut accepted = Vec::with_capacity(entries.len());
        for (key, data) in entries {
            if self.items.get(&key).is_some_and(|held| held.cached_at > fetched_at) {
                debug!(category = %self.category, key = %key, "Ignoring superseded result");
                continue;
            }
            self.items.insert(key.clone(), Stamped { data, cached_at: fetched_at });
            accepted.push(key);
        }
        accepted
    }

    /// Fill in from cache without replacing anything as new or newer.
    fn apply_cached(&mut self, cached: impl IntoIterator<Item = (String, T, DateTime<Utc>)>) -> usize {
        let mut applied = 0;
        for (key, data, cached_at) in cached {
            if self.items.get(&key).is_some_and(|held| held.cached_at >= cached_at) {
                continue;
            }
            self.items.insert(key, Stamped { data, cached_at });
            applied += 1;
        }
        applied
    }

    /// Drop items a complete listing no longer contains. Returns the
    /// removed keys.
    fn retain_listed(&mut self, listed: &HashSet<String>, fetched_at: DateTime<Utc>) -> Vec<String> {
        let removed: Vec<String> = self
            .items
            .iter()
            .filter(|(key, held)| !listed.contains(*key) && held.cached_at < fetched_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &removed {
            self.items.remove(key);
        }
        removed
    }

    fn oldest_in(&self, scope: Option<&HashSet<String>>) -> Option<DateTime<Utc>> {
        match scope {
            Some(scope) => self
                .items
                .iter()
                .filter(|(key, _)| scope.contains(*key))
                .map(|(_, held)| held.cached_at)
                .min(),
            None => self.items.values().map(|held| held.cached_at).min(),
        }
    }

    /// Oldest item among the ids the latest run targeted, or among all
    /// items when that run held none of them.
    fn oldest(&self) -> Option<DateTime<Utc>> {
        self.oldest_in(self.targeted.as_ref())
            .or_else(|| self.oldest_in(None))
    }

    fn view(&self, key: &str, policy: &StalenessPolicy, now: DateTime<Utc>) -> Option<CachedView<T>>
    where
        T: Clone,
    {
        let held = self.items.get(key)?;
        Some(CachedView {
            data: held.data.clone(),
            cached_at: held.cached_at,
            is_stale: policy.is_stale(self.category, now - held.cached_at),
        })
    }
}

/// The type-independent operations the orchestrator runs on any category.
trait CategoryOps {
    fn sync_state(&self) -> SyncState;
    fn has_data(&self) -> bool;
    /// `scope` limits the check to the ids a refresh would request
    fn is_fresh(&self, policy: &StalenessPolicy, now: DateTime<Utc>, scope: Option<&HashSet<String>>) -> bool;
    fn begin(&mut self, targeted: Option<HashSet<String>>);
    /// Returns whether the run fell back to cache
    fn finish(&mut self) -> bool;
    fn hydrate(&mut self, store: &PersistentStore) -> usize;
    fn fallback_all(&mut self, store: &PersistentStore) -> usize;
    fn fallback_keys(&mut self, store: &PersistentStore, keys: &[String]) -> usize;
    fn record_failure(&mut self, error: ApiError);
    fn status(&self, policy: &StalenessPolicy, now: DateTime<Utc>) -> DataStatus;
    fn clear(&mut self);
}

impl<T: Serialize + DeserializeOwned> CategoryOps for CategoryState<T> {
    fn sync_state(&self) -> SyncState {
        self.sync
    }

    fn has_data(&self) -> bool {
        !self.items.is_empty()
    }

    fn is_fresh(&self, policy: &StalenessPolicy, now: DateTime<Utc>, scope: Option<&HashSet<String>>) -> bool {
        if let Some(scope) = scope {
            // An id never asked for before is missing, not fresh
            let untried = scope.iter().any(|id| {
                !self.items.contains_key(id)
                    && !self.targeted.as_ref().is_some_and(|targeted| targeted.contains(id))
            });
            if untried {
                return false;
            }
        }
        self.oldest_in(scope)
            .is_some_and(|oldest| !policy.is_stale(self.category, now - oldest))
    }

    fn begin(&mut self, targeted: Option<HashSet<String>>) {
        self.sync = SyncState::Loading;
        self.run_failed = false;
        self.targeted = targeted;
    }

    fn finish(&mut self) -> bool {
        self.sync = SyncState::Done {
            from_cache: self.run_failed,
        };
        if !self.run_failed {
            self.using_cached_data = false;
            self.last_error = None;
        }
        self.run_failed
    }

    fn hydrate(&mut self, store: &PersistentStore) -> usize {
        let restored = self.fallback_all(store);
        if self.has_data() {
            self.using_cached_data = true;
        }
        restored
    }

    fn fallback_all(&mut self, store: &PersistentStore) -> usize {
        let entries = store.entries::<T>(self.category);
        self.apply_cached(
            entries
                .into_iter()
                .map(|entry| (entry.key, entry.payload, entry.cached_at)),
        )
    }

    fn fallback_keys(&mut self, store: &PersistentStore, keys: &[String]) -> usize {
        let cached = store.get_many::<T>(self.category, keys);
        self.apply_cached(
            cached
                .into_iter()
                .map(|(key, view)| (key, view.data, view.cached_at)),
        )
    }

    fn record_failure(&mut self, error: ApiError) {
        self.run_failed = true;
        if self.has_data() {
            self.using_cached_data = true;
        }
        self.last_error = Some(error);
    }

    fn status(&self, policy: &StalenessPolicy, now: DateTime<Utc>) -> DataStatus {
        let oldest = self.oldest();
        let has_data = oldest.is_some();
        DataStatus {
            has_data,
            is_stale: oldest.is_some_and(|oldest| policy.is_stale(self.category, now - oldest)),
            is_using_cached_data: has_data && self.using_cached_data,
            unable_to_load: !has_data && self.last_error.is_some(),
            age_description: oldest.map(|oldest| format_age(now - oldest)),
            last_error_summary: self.last_error.as_ref().map(ApiError::user_summary),
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.using_cached_data = false;
        self.last_error = None;
        self.targeted = None;
    }
}

/// Store writes happen only for values memory accepted, so a superseded
/// result can never overwrite newer data on disk.
fn persist_fresh<T: Serialize>(
    store: &PersistentStore,
    state: &mut CategoryState<T>,
    entries: HashMap<String, T>,
    fetched_at: DateTime<Utc>,
) -> usize {
    let accepted = state.apply_fresh(entries, fetched_at);
    store.put_many(
        state.category,
        accepted
            .iter()
            .filter_map(|key| state.items.get(key).map(|held| (key.as_str(), &held.data))),
        fetched_at,
    );
    accepted.len()
}

// ============================================================================
// Public types
// ============================================================================

/// How many entries hydration restored per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationSummary {
    pub resorts: usize,
    pub conditions: usize,
    pub snow_quality: usize,
}

impl HydrationSummary {
    pub fn total(&self) -> usize {
        self.resorts + self.conditions + self.snow_quality
    }
}

/// A value of any category, for category-agnostic reads.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedItem {
    Resort(Resort),
    Conditions(Vec<WeatherCondition>),
    SnowQuality(SnowQualitySummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    Started,
    InFlight,
    Fresh,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct SyncOrchestrator {
    store: Arc<PersistentStore>,
    remote: Arc<dyn RemoteDataSource>,
    preferences: watch::Receiver<UserPreferences>,
    settings: SyncSettings,

    resorts: CategoryState<Resort>,
    conditions: CategoryState<Vec<WeatherCondition>>,
    snow_quality: CategoryState<SnowQualitySummary>,

    tx: mpsc::Sender<SyncMessage>,
    rx: mpsc::Receiver<SyncMessage>,
    board: watch::Sender<SyncBoard>,
    revision: u64,

    /// Trigger for conditions and summaries waiting on the resort list
    pending_dependents: Option<RefreshTrigger>,
    /// Categories of the manual refresh currently running
    manual_pending: HashSet<Category>,
    last_manual_completed: Option<Instant>,
    /// Categories of the full sync currently running
    full_sync_pending: HashSet<Category>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<PersistentStore>,
        remote: Arc<dyn RemoteDataSource>,
        preferences: watch::Receiver<UserPreferences>,
        settings: SyncSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let (board, _) = watch::channel(SyncBoard::default());
        Self {
            store,
            remote,
            preferences,
            settings,
            resorts: CategoryState::new(Category::Resort),
            conditions: CategoryState::new(Category::ConditionSet),
            snow_quality: CategoryState::new(Category::SnowQualitySummary),
            tx,
            rx,
            board,
            revision: 0,
            pending_dependents: None,
            manual_pending: HashSet::new(),
            last_manual_completed: None,
            full_sync_pending: HashSet::new(),
        }
    }

    fn state(&self, category: Category) -> &dyn CategoryOps {
        match category {
            Category::Resort => &self.resorts,
            Category::ConditionSet => &self.conditions,
            Category::SnowQualitySummary => &self.snow_quality,
        }
    }

    fn state_mut(&mut self, category: Category) -> &mut dyn CategoryOps {
        match category {
            Category::Resort => &mut self.resorts,
            Category::ConditionSet => &mut self.conditions,
            Category::SnowQualitySummary => &mut self.snow_quality,
        }
    }

    /// The store alongside one category's state, borrowed together.
    fn parts(&mut self, category: Category) -> (&PersistentStore, &mut dyn CategoryOps) {
        let state: &mut dyn CategoryOps = match category {
            Category::Resort => &mut self.resorts,
            Category::ConditionSet => &mut self.conditions,
            Category::SnowQualitySummary => &mut self.snow_quality,
        };
        (self.store.as_ref(), state)
    }

    // ===== Status =====

    pub fn subscribe(&self) -> watch::Receiver<SyncBoard> {
        self.board.subscribe()
    }

    pub fn board(&self) -> SyncBoard {
        self.board.borrow().clone()
    }

    pub fn status(&self, category: Category) -> DataStatus {
        self.state(category)
            .status(self.store.policy(), self.store.now())
    }

    pub fn sync_state(&self, category: Category) -> SyncState {
        self.state(category).sync_state()
    }

    /// Whether any category has a fetch running
    pub fn is_busy(&self) -> bool {
        Category::ALL
            .iter()
            .any(|&category| self.sync_state(category) == SyncState::Loading)
    }

    fn publish(&mut self) {
        self.revision += 1;
        let policy = self.store.policy();
        let now = self.store.now();
        let board = SyncBoard {
            revision: self.revision,
            resorts: self.resorts.status(policy, now),
            conditions: self.conditions.status(policy, now),
            snow_quality: self.snow_quality.status(policy, now),
        };
        self.board.send_replace(board);
    }

    // ===== Hydration =====

    /// Load everything the store holds into memory. No network.
    pub fn hydrate(&mut self) -> HydrationSummary {
        let store = Arc::clone(&self.store);
        let summary = HydrationSummary {
            resorts: self.resorts.hydrate(&store),
            conditions: self.conditions.hydrate(&store),
            snow_quality: self.snow_quality.hydrate(&store),
        };
        info!(
            resorts = summary.resorts,
            conditions = summary.conditions,
            snow_quality = summary.snow_quality,
            "Hydrated from cache"
        );
        self.publish();
        summary
    }

    // ===== Refresh =====

    fn cooldown_remaining(&self, trigger: RefreshTrigger) -> Option<Duration> {
        if trigger != RefreshTrigger::Manual {
            return None;
        }
        let ready_at = self.last_manual_completed? + self.settings.manual_refresh_cooldown;
        let now = Instant::now();
        (ready_at > now).then(|| ready_at - now)
    }

    /// Refresh one category in the background.
    pub fn refresh(&mut self, category: Category, trigger: RefreshTrigger) -> RefreshOutcome {
        if let Some(retry_after) = self.cooldown_remaining(trigger) {
            info!(category = %category, retry_after_ms = retry_after.as_millis() as u64, "Manual refresh rate limited");
            return RefreshOutcome::RateLimited { retry_after };
        }
        match self.start(category, trigger) {
            Start::Started => RefreshOutcome::Started(vec![category]),
            Start::InFlight => RefreshOutcome::AlreadyInFlight,
            Start::Fresh => RefreshOutcome::UpToDate,
        }
    }

    /// Refresh every category. Conditions and summaries wait for the resort
    /// list when no resort ids are known yet.
    pub fn refresh_all(&mut self, trigger: RefreshTrigger) -> RefreshOutcome {
        if let Some(retry_after) = self.cooldown_remaining(trigger) {
            info!(retry_after_ms = retry_after.as_millis() as u64, "Manual refresh rate limited");
            return RefreshOutcome::RateLimited { retry_after };
        }

        let mut categories = vec![Category::Resort];
        let waits_for_resorts = !self.resorts.has_data();
        if !waits_for_resorts {
            categories.extend([Category::ConditionSet, Category::SnowQualitySummary]);
        }

        let mut started = Vec::new();
        let mut in_flight = false;
        for category in categories {
            match self.start(category, trigger) {
                Start::Started => started.push(category),
                Start::InFlight => in_flight = true,
                Start::Fresh => {}
            }
        }

        if waits_for_resorts && self.resorts.sync_state() == SyncState::Loading {
            // Joins any earlier request; a manual one wins
            let merged = match self.pending_dependents {
                Some(RefreshTrigger::Manual) => RefreshTrigger::Manual,
                _ => trigger,
            };
            debug!(trigger = ?merged, "No resort ids known yet, dependents wait for the resort list");
            self.pending_dependents = Some(merged);
        }

        if started.is_empty() {
            return if in_flight {
                RefreshOutcome::AlreadyInFlight
            } else {
                RefreshOutcome::UpToDate
            };
        }
        self.full_sync_pending.extend(started.iter().copied());
        RefreshOutcome::Started(started)
    }

    fn start(&mut self, category: Category, trigger: RefreshTrigger) -> Start {
        if self.state(category).sync_state() == SyncState::Loading {
            debug!(category = %category, "Refresh already in flight");
            return Start::InFlight;
        }

        let ids = match category {
            Category::Resort => Vec::new(),
            Category::ConditionSet => self.batch_candidates(self.settings.max_conditions_fetch),
            Category::SnowQualitySummary => self.batch_candidates(self.settings.max_snow_quality_fetch),
        };
        let scope: Option<HashSet<String>> =
            (category != Category::Resort).then(|| ids.iter().cloned().collect());

        let state = self.state(category);
        if trigger == RefreshTrigger::Automatic
            && state.is_fresh(self.store.policy(), self.store.now(), scope.as_ref())
        {
            debug!(category = %category, "Cached data still fresh, skipping refresh");
            return Start::Fresh;
        }

        self.state_mut(category).begin(scope);
        if trigger == RefreshTrigger::Manual {
            self.manual_pending.insert(category);
        }

        match category {
            Category::Resort => self.spawn_resorts(),
            Category::ConditionSet => {
                self.spawn_batch(
                    category,
                    ids,
                    CONDITIONS_CHUNK_SIZE,
                    |remote, chunk| async move { remote.fetch_conditions(&chunk).await },
                    |entries, fetched_at| SyncMessage::Conditions { entries, fetched_at },
                );
            }
            Category::SnowQualitySummary => {
                self.spawn_batch(
                    category,
                    ids,
                    SNOW_QUALITY_CHUNK_SIZE,
                    |remote, chunk| async move { remote.fetch_snow_quality(&chunk).await },
                    |entries, fetched_at| SyncMessage::SnowQuality { entries, fetched_at },
                );
            }
        }
        info!(category = %category, trigger = ?trigger, "Refresh started");
        Start::Started
    }

    /// Known resorts outside hidden regions plus every favorite,
    /// favorites first, capped.
    fn batch_candidates(&self, cap: usize) -> Vec<String> {
        let preferences = self.preferences.borrow();
        let mut ids: BTreeSet<String> = self
            .resorts
            .items
            .values()
            .map(|held| &held.data)
            .filter(|resort| {
                preferences.is_favorite(&resort.id)
                    || !preferences.is_region_hidden(resort.region.as_deref())
            })
            .map(|resort| resort.id.clone())
            .collect();
        ids.extend(preferences.favorite_resort_ids.iter().cloned());

        let ids: Vec<String> = ids.into_iter().collect();
        prioritize_ids(&ids, &preferences.favorite_resort_ids, cap)
    }

    fn spawn_resorts(&self) {
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        let clock = self.store.clock();
        tokio::spawn(async move {
            let category = Category::Resort;
            match remote.list_resorts().await {
                Ok(resorts) => {
                    let fetched_at = clock.now();
                    send_message(&tx, SyncMessage::Resorts { resorts, fetched_at }).await;
                }
                Err(error) => send_message(&tx, SyncMessage::Failed { category, error }).await,
            }
            send_message(&tx, SyncMessage::Finished { category }).await;
        });
    }

    fn spawn_batch<T, F, Fut>(
        &self,
        category: Category,
        ids: Vec<String>,
        chunk_size: usize,
        fetch: F,
        wrap: fn(HashMap<String, T>, DateTime<Utc>) -> SyncMessage,
    ) where
        T: Send + 'static,
        F: Fn(Arc<dyn RemoteDataSource>, Vec<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<HashMap<String, T>, ApiError>> + Send + 'static,
    {
        let remote = Arc::clone(&self.remote);
        let tx = self.tx.clone();
        let clock = self.store.clock();
        debug!(category = %category, ids = ids.len(), "Fetching batch");

        tokio::spawn(async move {
            let outcomes = batch_stream(ids, chunk_size, move |chunk| fetch(Arc::clone(&remote), chunk));
            futures::pin_mut!(outcomes);
            while let Some(outcome) = outcomes.next().await {
                forward_chunk(&tx, category, outcome, clock.now(), wrap).await;
            }
            send_message(&tx, SyncMessage::Finished { category }).await;
        });
    }

    fn spawn_cleanup(&self) {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let removed = store.cleanup_expired();
            debug!(removed, "Expired cache entries swept");
        });
    }

    // ===== Applying results =====

    /// Apply every message already received. Never waits.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Apply messages until no category is loading.
    pub async fn run_until_idle(&mut self) {
        while self.is_busy() {
            match self.rx.recv().await {
                Some(message) => self.apply(message),
                None => break,
            }
        }
        self.process_pending();
    }

    fn apply(&mut self, message: SyncMessage) {
        match message {
            SyncMessage::Resorts { resorts, fetched_at } => {
                let entries: HashMap<String, Resort> = resorts
                    .into_iter()
                    .map(|resort| (resort.id.clone(), resort))
                    .collect();
                let listed: HashSet<String> = entries.keys().cloned().collect();
                let applied = persist_fresh(&self.store, &mut self.resorts, entries, fetched_at);
                let removed = self.resorts.retain_listed(&listed, fetched_at);
                for key in &removed {
                    self.store.delete(Category::Resort, key);
                }
                info!(applied, removed = removed.len(), "Resorts applied");
            }
            SyncMessage::Conditions { entries, fetched_at } => {
                let applied = persist_fresh(&self.store, &mut self.conditions, entries, fetched_at);
                debug!(applied, "Condition sets applied");
            }
            SyncMessage::SnowQuality { entries, fetched_at } => {
                let applied = persist_fresh(&self.store, &mut self.snow_quality, entries, fetched_at);
                debug!(applied, "Snow quality summaries applied");
            }
            SyncMessage::Unresolved { category, ids, error } => {
                self.apply_unresolved(category, ids, error);
            }
            SyncMessage::Failed { category, error } => {
                let (store, state) = self.parts(category);
                let restored = if error.is_fallback_eligible() {
                    state.fallback_all(store)
                } else {
                    0
                };
                warn!(category = %category, restored, error = %error, "Refresh failed, showing cached data");
                state.record_failure(error);
            }
            SyncMessage::Finished { category } => self.finish(category),
        }
        self.publish();
    }

    fn apply_unresolved(&mut self, category: Category, ids: Vec<String>, error: Option<ApiError>) {
        let (store, state) = self.parts(category);
        match error {
            Some(error) => {
                let restored = if error.is_fallback_eligible() {
                    state.fallback_keys(store, &ids)
                } else {
                    0
                };
                warn!(
                    category = %category,
                    ids = ids.len(),
                    restored,
                    error = %error,
                    "Chunk failed, showing cached data"
                );
                state.record_failure(error);
            }
            None => {
                let restored = state.fallback_keys(store, &ids);
                debug!(category = %category, ids = ids.len(), restored, "Ids missing from response");
            }
        }
    }

    fn finish(&mut self, category: Category) {
        let from_cache = self.state_mut(category).finish();
        info!(category = %category, from_cache, "Refresh finished");

        if category == Category::Resort {
            if let Some(trigger) = self.pending_dependents.take() {
                for dependent in [Category::ConditionSet, Category::SnowQualitySummary] {
                    if self.start(dependent, trigger) == Start::Started
                        && self.full_sync_pending.contains(&Category::Resort)
                    {
                        self.full_sync_pending.insert(dependent);
                    }
                }
            }
        }

        if self.manual_pending.remove(&category) && self.manual_pending.is_empty() {
            self.last_manual_completed = Some(Instant::now());
        }
        if self.full_sync_pending.remove(&category) && self.full_sync_pending.is_empty() {
            self.spawn_cleanup();
        }
    }

    // ===== Reads =====

    /// One resort, from memory or else the store.
    pub fn read_resort(&self, id: &str) -> Option<CachedView<Resort>> {
        self.resorts
            .view(id, self.store.policy(), self.store.now())
            .or_else(|| self.store.get(Category::Resort, id))
    }

    /// Every condition reading for a resort.
    pub fn read_conditions(&self, resort_id: &str) -> Option<CachedView<Vec<WeatherCondition>>> {
        self.conditions
            .view(resort_id, self.store.policy(), self.store.now())
            .or_else(|| self.store.get(Category::ConditionSet, resort_id))
    }

    /// The reading for one elevation band of a resort.
    pub fn read_condition(
        &self,
        resort_id: &str,
        level: ElevationLevel,
    ) -> Option<CachedView<WeatherCondition>> {
        let view = self.read_conditions(resort_id)?;
        let reading = view.data.iter().find(|c| c.elevation == level)?.clone();
        Some(view.map(|_| reading))
    }

    pub fn read_snow_quality(&self, resort_id: &str) -> Option<CachedView<SnowQualitySummary>> {
        self.snow_quality
            .view(resort_id, self.store.policy(), self.store.now())
            .or_else(|| self.store.get(Category::SnowQualitySummary, resort_id))
    }

    /// Category-agnostic read. Condition keys may carry an elevation
    /// suffix (`"whistler:top"`).
    pub fn read(&self, category: Category, key: &str) -> Option<CachedView<CachedItem>> {
        match category {
            Category::Resort => self.read_resort(key).map(|v| v.map(CachedItem::Resort)),
            Category::ConditionSet => match split_condition_key(key) {
                (resort_id, Some(level)) => self
                    .read_condition(resort_id, level)
                    .map(|v| v.map(|reading| CachedItem::Conditions(vec![reading]))),
                (resort_id, None) => self
                    .read_conditions(resort_id)
                    .map(|v| v.map(CachedItem::Conditions)),
            },
            Category::SnowQualitySummary => self
                .read_snow_quality(key)
                .map(|v| v.map(CachedItem::SnowQuality)),
        }
    }

    /// Every known resort, favorites first, then by name.
    pub fn resorts(&self) -> Vec<Resort> {
        let preferences = self.preferences.borrow();
        let mut resorts: Vec<Resort> = self
            .resorts
            .items
            .values()
            .map(|held| held.data.clone())
            .collect();
        resorts.sort_by(|a, b| {
            preferences
                .is_favorite(&b.id)
                .cmp(&preferences.is_favorite(&a.id))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        resorts
    }

    // ===== Maintenance =====

    /// Drop every cached entry on disk and in memory.
    pub fn clear_cache(&mut self) -> anyhow::Result<()> {
        self.store.clear_all()?;
        for category in Category::ALL {
            self.state_mut(category).clear();
        }
        info!("Cache cleared");
        self.publish();
        Ok(())
    }
}

async fn forward_chunk<T>(
    tx: &mpsc::Sender<SyncMessage>,
    category: Category,
    outcome: ChunkOutcome<T>,
    fetched_at: DateTime<Utc>,
    wrap: fn(HashMap<String, T>, DateTime<Utc>) -> SyncMessage,
) {
    let unresolved = outcome.unresolved_ids();
    let ChunkOutcome { ids, result, .. } = outcome;
    match result {
        Ok(mut found) => {
            found.retain(|id, _| ids.contains(id));
            if !found.is_empty() {
                send_message(tx, wrap(found, fetched_at)).await;
            }
            if !unresolved.is_empty() {
                send_message(
                    tx,
                    SyncMessage::Unresolved {
                        category,
                        ids: unresolved,
                        error: None,
                    },
                )
                .await;
            }
        }
        Err(error) => {
            send_message(
                tx,
                SyncMessage::Unresolved {
                    category,
                    ids: unresolved,
                    error: Some(error),
                },
            )
            .await;
        }
    }
}
