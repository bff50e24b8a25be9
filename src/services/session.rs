//! Explicit authentication context for the property API.
//!
//! The session is passed to the client that needs it instead of living in a
//! process-wide store. It can be persisted to a small JSON file and picked up
//! from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to read session: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub api_base: String,
    /// Bearer token; `None` means anonymous
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Id of the signed-in user, when already known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Session {
    pub fn anonymous(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: None,
            user_id: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Session from `MARKETKIT_SESSION` (a session file) and `MARKETKIT_TOKEN`.
    ///
    /// The token variable wins over a token stored in the file. Without
    /// either, the session is anonymous against `default_base`.
    pub fn from_env(default_base: &str) -> Self {
        let mut session = match std::env::var("MARKETKIT_SESSION") {
            Ok(path) => Self::load(Path::new(&path)).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "Ignoring unreadable session file");
                Self::anonymous(default_base)
            }),
            Err(_) => Self::anonymous(default_base),
        };
        if let Ok(token) = std::env::var("MARKETKIT_TOKEN") {
            session.token = Some(token);
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let session = Session {
            api_base: "https://api.example.com".to_string(),
            token: Some("abc".to_string()),
            user_id: Some("42".to_string()),
        };
        session.save(&path).unwrap();
        assert_eq!(Session::load(&path).unwrap(), session);
    }

    #[test]
    fn test_anonymous() {
        let session = Session::anonymous("http://localhost:8000");
        assert!(!session.is_authenticated());
        assert!(session.with_token("t").is_authenticated());
        assert!(!Session::anonymous("x").with_token("").is_authenticated());
    }

    #[test]
    fn test_load_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "nope").unwrap();
        assert!(matches!(Session::load(&path), Err(SessionError::Json(_))));
        assert!(matches!(
            Session::load(&dir.path().join("missing.json")),
            Err(SessionError::Io(_))
        ));
    }
}
