//! Authenticator double that records who the story acted as.

use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use storyboard::Authenticator;

/// One call made against a [`RecordingAuthenticator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// `login` with the given user.
    Login(Value),
    /// `logout`.
    Logout,
}

/// Clonable [`Authenticator`] whose clones share one call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingAuthenticator {
    sessions: Arc<Mutex<Vec<Session>>>,
}

impl RecordingAuthenticator {
    /// Create an authenticator with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far, oldest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session);
    }
}

impl Authenticator for RecordingAuthenticator {
    fn login(&self, user: &Value) -> anyhow::Result<()> {
        self.record(Session::Login(user.clone()));
        Ok(())
    }

    fn logout(&self) -> anyhow::Result<()> {
        self.record(Session::Logout);
        Ok(())
    }
}
