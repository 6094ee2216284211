//! The acting user of a story and the adapter that logs them in.

use serde_json::Value;

/// Logs users in and out of the system under test.
#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    /// Act as `user` for the rest of the story.
    ///
    /// # Errors
    ///
    /// Returns an error when the user cannot be logged in.
    fn login(&self, user: &Value) -> anyhow::Result<()>;

    /// Stop acting as any user.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cannot be ended.
    fn logout(&self) -> anyhow::Result<()>;
}

/// Authenticator used when the suite has none configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuthenticator;

impl Authenticator for NullAuthenticator {
    fn login(&self, _user: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn logout(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
