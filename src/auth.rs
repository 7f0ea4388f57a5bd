//! Login session persisted between runs.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
  pub id: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub role: String,
}

/// Tokens returned by `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
  pub user: SessionUser,
}

impl Session {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at
  }

  pub fn is_authenticated(&self) -> bool {
    !self.is_expired_at(Utc::now())
  }
}

/// JSON file holding the current [`Session`].
pub struct SessionStore {
  path: PathBuf,
}

impl SessionStore {
  /// Session store at the default location.
  pub fn open() -> Result<Self> {
    Ok(Self::at(Self::default_path()?))
  }

  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Get the default session path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("taskboard").join("session.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the stored session. Expired or unreadable sessions count as none.
  pub fn load(&self) -> Result<Option<Session>> {
    if !self.path.exists() {
      return Ok(None);
    }

    let contents = std::fs::read_to_string(&self.path)
      .map_err(|e| eyre!("Failed to read session {}: {}", self.path.display(), e))?;

    match serde_json::from_str::<Session>(&contents) {
      Ok(session) if session.is_authenticated() => Ok(Some(session)),
      Ok(_) => {
        tracing::info!("stored session has expired");
        Ok(None)
      }
      Err(e) => {
        tracing::warn!(error = %e, "ignoring unreadable session file");
        Ok(None)
      }
    }
  }

  pub fn save(&self, session: &Session) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let contents = serde_json::to_string_pretty(session)
      .map_err(|e| eyre!("Failed to serialize session: {}", e))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write session {}: {}", self.path.display(), e))?;

    Ok(())
  }

  /// Remove the stored session (logout).
  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!(
        "Failed to remove session {}: {}",
        self.path.display(),
        e
      )),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn session(expires_at: DateTime<Utc>) -> Session {
    Session {
      token: "abc".to_string(),
      refresh_token: "def".to_string(),
      expires_at,
      user: SessionUser {
        id: "user-1".to_string(),
        email: "alice@example.com".to_string(),
        name: "Alice".to_string(),
        role: "admin".to_string(),
      },
    }
  }

  fn temp_store(name: &str) -> SessionStore {
    let dir = std::env::temp_dir().join(format!("taskboard-test-{}-{}", name, std::process::id()));
    SessionStore::at(dir.join("session.json"))
  }

  #[test]
  fn test_login_response_shape() {
    let session: Session = serde_json::from_str(
      r#"{"token":"t","refreshToken":"r","expiresAt":"2030-01-01T00:00:00Z",
          "user":{"id":"user-1","email":"a@b.c","name":"Alice","role":"user"}}"#,
    )
    .unwrap();
    assert_eq!(session.refresh_token, "r");
    assert!(session.is_authenticated());
  }

  #[test]
  fn test_expiry() {
    let now = Utc::now();
    assert!(session(now - Duration::seconds(1)).is_expired_at(now));
    assert!(!session(now + Duration::hours(1)).is_expired_at(now));
  }

  #[test]
  fn test_save_load_clear() {
    let store = temp_store("roundtrip");
    let saved = session(Utc::now() + Duration::hours(1));
    store.save(&saved).unwrap();
    assert_eq!(store.load().unwrap(), Some(saved));

    store.clear().unwrap();
    assert_eq!(store.load().unwrap(), None);
    // Clearing twice is fine
    store.clear().unwrap();
  }

  #[test]
  fn test_expired_session_is_not_loaded() {
    let store = temp_store("expired");
    store.save(&session(Utc::now() - Duration::hours(1))).unwrap();
    assert_eq!(store.load().unwrap(), None);
    store.clear().unwrap();
  }
}
