//! Debounced mirroring of user preferences to the backend.
//!
//! Local state is the source of truth. Every mutation is applied and written
//! to `preferences.json` immediately; the backend receives the latest full
//! snapshot once mutations stop arriving for the debounce interval.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiError, RemoteDataSource};
use crate::auth::Session;
use crate::models::UserPreferences;

/// Preferences file name inside the data directory
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Local copy of the preference snapshot.
#[derive(Debug, Clone)]
pub struct PreferenceFile {
    path: PathBuf,
}

impl PreferenceFile {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(PREFERENCES_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved snapshot. A missing file reads as defaults.
    pub fn load(&self) -> Result<UserPreferences> {
        if !self.path.exists() {
            return Ok(UserPreferences::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Like `load`, but an unreadable file is logged and replaced by defaults.
    pub fn load_or_default(&self) -> UserPreferences {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable preferences file");
            UserPreferences::default()
        })
    }

    pub fn save(&self, preferences: &UserPreferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(preferences)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

/// Applies preference mutations locally and pushes the final snapshot of
/// each burst to the backend.
pub struct PreferenceSyncQueue {
    current: watch::Sender<UserPreferences>,
    file: Option<PreferenceFile>,
    worker: JoinHandle<()>,
}

impl PreferenceSyncQueue {
    /// Start the push worker. Must be called inside a tokio runtime.
    pub fn new(
        initial: UserPreferences,
        remote: Arc<dyn RemoteDataSource>,
        session: Arc<Session>,
        debounce: Duration,
    ) -> Self {
        let (current, rx) = watch::channel(initial);
        let worker = tokio::spawn(push_worker(remote, session, rx, debounce));
        Self {
            current,
            file: None,
            worker,
        }
    }

    /// Persist every mutation to `file`
    pub fn with_file(mut self, file: PreferenceFile) -> Self {
        self.file = Some(file);
        self
    }

    /// Apply `mutation` now, save it locally, and schedule a push.
    /// Returns the new snapshot.
    pub fn enqueue<F>(&self, mutation: F) -> UserPreferences
    where
        F: FnOnce(&mut UserPreferences),
    {
        self.current.send_modify(mutation);
        let snapshot = self.current.borrow().clone();
        if let Some(ref file) = self.file {
            if let Err(e) = file.save(&snapshot) {
                warn!(error = %e, "Failed to save preferences locally");
            }
        }
        debug!(favorites = snapshot.favorite_resort_ids.len(), "Preferences updated");
        snapshot
    }

    pub fn snapshot(&self) -> UserPreferences {
        self.current.borrow().clone()
    }

    /// Receiver that sees every local change immediately
    pub fn subscribe(&self) -> watch::Receiver<UserPreferences> {
        self.current.subscribe()
    }

    /// Push anything still pending without waiting out the debounce, then
    /// stop the worker.
    pub async fn shutdown(self) {
        let Self { current, worker, .. } = self;
        drop(current);
        if let Err(e) = worker.await {
            warn!(error = %e, "Preference worker ended abnormally");
        }
    }
}

/// Wait for a change, then keep pushing the deadline back while changes keep
/// coming. Exits when the queue is dropped, pushing first if a change is
/// still pending.
async fn push_worker(
    remote: Arc<dyn RemoteDataSource>,
    session: Arc<Session>,
    mut rx: watch::Receiver<UserPreferences>,
    debounce: Duration,
) {
    loop {
        if rx.changed().await.is_err() {
            break;
        }

        let deadline = sleep(debounce);
        tokio::pin!(deadline);
        let mut closed = false;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                changed = rx.changed() => match changed {
                    Ok(()) => deadline.as_mut().reset(Instant::now() + debounce),
                    Err(_) => {
                        closed = true;
                        break;
                    }
                },
            }
        }

        let snapshot = rx.borrow_and_update().clone();
        push_snapshot(remote.as_ref(), &session, &snapshot).await;
        if closed {
            break;
        }
    }
    debug!("Preference worker stopped");
}

async fn push_snapshot(remote: &dyn RemoteDataSource, session: &Session, snapshot: &UserPreferences) {
    if !session.is_authenticated() {
        debug!("Not signed in, preference push skipped");
        return;
    }
    match remote.push_preferences(snapshot).await {
        Ok(()) => info!(favorites = snapshot.favorite_resort_ids.len(), "Preferences synced"),
        Err(ApiError::Unauthorized) => {
            warn!("Preference push rejected, session expired");
        }
        Err(e) => warn!(error = %e, "Preference push failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionData;
    use crate::models::{Resort, SnowQualitySummary, TemperatureUnit, WeatherCondition};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRemote {
        pushes: Mutex<Vec<UserPreferences>>,
        reject: bool,
    }

    impl RecordingRemote {
        fn pushes(&self) -> Vec<UserPreferences> {
            self.pushes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteDataSource for RecordingRemote {
        async fn list_resorts(&self) -> Result<Vec<Resort>, ApiError> {
            Ok(Vec::new())
        }

        async fn fetch_conditions(
            &self,
            _ids: &[String],
        ) -> Result<HashMap<String, Vec<WeatherCondition>>, ApiError> {
            Ok(HashMap::new())
        }

        async fn fetch_snow_quality(
            &self,
            _ids: &[String],
        ) -> Result<HashMap<String, SnowQualitySummary>, ApiError> {
            Ok(HashMap::new())
        }

        async fn push_preferences(&self, snapshot: &UserPreferences) -> Result<(), ApiError> {
            self.pushes.lock().unwrap().push(snapshot.clone());
            if self.reject {
                Err(ApiError::Unauthorized)
            } else {
                Ok(())
            }
        }
    }

    fn signed_in() -> Arc<Session> {
        Arc::new(Session::in_memory(Some(SessionData::new("token"))))
    }

    fn queue(remote: &Arc<RecordingRemote>, session: Arc<Session>) -> PreferenceSyncQueue {
        PreferenceSyncQueue::new(
            UserPreferences::default(),
            remote.clone() as Arc<dyn RemoteDataSource>,
            session,
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_push() {
        let remote = Arc::new(RecordingRemote::default());
        let queue = queue(&remote, signed_in());

        for id in ["vail", "aspen", "telluride", "vail", "taos"] {
            queue.enqueue(|prefs| {
                prefs.toggle_favorite(id);
            });
            sleep(Duration::from_millis(150)).await;
        }
        let last = queue.snapshot();
        sleep(Duration::from_millis(1500)).await;

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0], last);
        assert!(!pushes[0].is_favorite("vail"));
        assert!(pushes[0].is_favorite("taos"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_push_separately() {
        let remote = Arc::new(RecordingRemote::default());
        let queue = queue(&remote, signed_in());

        queue.enqueue(|prefs| prefs.units.temperature = TemperatureUnit::Fahrenheit);
        sleep(Duration::from_secs(2)).await;
        queue.enqueue(|prefs| prefs.units.temperature = TemperatureUnit::Celsius);
        sleep(Duration::from_secs(2)).await;

        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1].units.temperature, TemperatureUnit::Celsius);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_out_skips_push() {
        let remote = Arc::new(RecordingRemote::default());
        let queue = queue(&remote, Arc::new(Session::in_memory(None)));

        let snapshot = queue.enqueue(|prefs| {
            prefs.toggle_favorite("vail");
        });
        sleep(Duration::from_secs(2)).await;

        assert!(remote.pushes().is_empty());
        assert!(snapshot.is_favorite("vail"));
        assert!(queue.snapshot().is_favorite("vail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_push_keeps_local_state() {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(RecordingRemote {
            reject: true,
            ..RecordingRemote::default()
        });
        let file = PreferenceFile::new(dir.path());
        let queue = queue(&remote, signed_in()).with_file(file.clone());

        queue.enqueue(|prefs| {
            prefs.toggle_favorite("vail");
        });
        sleep(Duration::from_secs(2)).await;

        assert_eq!(remote.pushes().len(), 1);
        assert!(queue.snapshot().is_favorite("vail"));
        assert!(file.load().unwrap().is_favorite("vail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_push() {
        let remote = Arc::new(RecordingRemote::default());
        let queue = queue(&remote, signed_in());

        queue.enqueue(|prefs| {
            prefs.hidden_regions.insert("Alps".to_string());
        });
        let started = Instant::now();
        queue.shutdown().await;

        assert!(started.elapsed() < Duration::from_secs(1));
        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].is_region_hidden(Some("alps")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_without_changes_pushes_nothing() {
        let remote = Arc::new(RecordingRemote::default());
        queue(&remote, signed_in()).shutdown().await;
        assert!(remote.pushes().is_empty());
    }

    #[test]
    fn test_preference_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = PreferenceFile::new(dir.path());
        assert_eq!(file.load().unwrap(), UserPreferences::default());

        let mut prefs = UserPreferences::default();
        prefs.toggle_favorite("whistler");
        file.save(&prefs).unwrap();

        assert_eq!(file.load().unwrap(), prefs);
        assert!(!dir.path().join("preferences.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_preference_file_reads_as_default() {
        let dir = TempDir::new().unwrap();
        let file = PreferenceFile::new(dir.path());
        fs::write(file.path(), "{not json").unwrap();

        assert!(file.load().is_err());
        assert_eq!(file.load_or_default(), UserPreferences::default());
    }
}
