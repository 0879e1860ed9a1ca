//! Session store: current actor plus persisted credential.

use farmhaul_core::Actor;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub actor: Actor,
    pub token: String,
}

impl Session {
    pub fn new(actor: Actor, token: impl Into<String>) -> Self {
        Self {
            actor,
            token: token.into(),
        }
    }
}

/// Holds the current session. One per process, shared by reference.
///
/// Changes are published on a watch channel so services can follow
/// login and logout without polling.
pub struct SessionStore {
    path: Option<PathBuf>,
    current: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// A store that forgets the session when the process exits.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: watch::Sender::new(None),
        }
    }

    /// A store that keeps the credential in a JSON file.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            current: watch::Sender::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load a previously persisted session, if any.
    pub fn restore(&self) -> Result<Option<Session>, SessionError> {
        let Some(path) = &self.path else {
            return Ok(self.current());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Io(e)),
        };
        let session: Session = serde_json::from_str(&text)?;
        tracing::debug!("Restored session for {}", session.actor);
        self.current.send_replace(Some(session.clone()));
        Ok(Some(session))
    }

    pub fn login(&self, session: Session) -> Result<(), SessionError> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec_pretty(&session)?)?;
        }
        tracing::info!("Logged in as {}", session.actor);
        self.current.send_replace(Some(session));
        Ok(())
    }

    /// Clear the session. The in-memory state is cleared even if removing
    /// the file fails.
    pub fn logout(&self) -> Result<(), SessionError> {
        if let Some(previous) = self.current.send_replace(None) {
            tracing::info!("Logged out {}", previous.actor);
        }
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(SessionError::Io(e)),
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn actor(&self) -> Option<Actor> {
        self.current.borrow().as_ref().map(|s| s.actor.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file: {0}")]
    Io(#[from] io::Error),
    #[error("session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
