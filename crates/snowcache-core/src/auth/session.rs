use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Tokens without a known expiry are treated as valid until cleared
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|expiry| Utc::now() > expiry).unwrap_or(false)
    }
}

/// Current authentication state, shared by `Arc` between the HTTP client and
/// the preference queue.
pub struct Session {
    dir: Option<PathBuf>,
    data: RwLock<Option<SessionData>>,
}

impl Session {
    /// A session persisted under `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir: Some(dir),
            data: RwLock::new(None),
        }
    }

    /// A session that lives only in memory
    pub fn in_memory(data: Option<SessionData>) -> Self {
        Self {
            dir: None,
            data: RwLock::new(data),
        }
    }

    /// Load session from disk. Returns whether a valid session was found.
    pub fn load(&self) -> Result<bool> {
        let Some(path) = self.session_path() else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.is_expired() {
            debug!("Stored session has expired");
            return Ok(false);
        }
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(data);
        Ok(true)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        let (Some(path), Some(data)) = (self.session_path(), self.data()) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Replace the session, e.g. after the host app signs the user in
    pub fn update(&self, data: SessionData) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(data);
    }

    /// Clear session data
    pub fn clear(&self) -> Result<()> {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = None;
        if let Some(path) = self.session_path() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn data(&self) -> Option<SessionData> {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Get the bearer token if the session is valid
    pub fn token(&self) -> Option<String> {
        self.data()
            .filter(|d| !d.is_expired())
            .map(|d| d.token)
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn session_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(SESSION_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expired_session_is_not_authenticated() {
        let mut data = SessionData::new("abc");
        data.expires_at = Some(Utc::now() - Duration::minutes(1));
        let session = Session::in_memory(Some(data));
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
    }

    #[test]
    fn test_session_without_expiry_is_valid() {
        let session = Session::in_memory(Some(SessionData::new("abc")));
        assert!(session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let session = Session::new(dir.path().to_path_buf());
        assert!(!session.load().expect("load empty"));

        session.update(SessionData::new("token-1"));
        session.save().expect("save session");

        let reloaded = Session::new(dir.path().to_path_buf());
        assert!(reloaded.load().expect("load saved"));
        assert_eq!(reloaded.token().as_deref(), Some("token-1"));

        reloaded.clear().expect("clear session");
        assert!(!reloaded.is_authenticated());
        assert!(!Session::new(dir.path().to_path_buf()).load().expect("load cleared"));
    }
}
