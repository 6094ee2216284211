//! Test utilities shared by the storyboard integration tests.
//!
//! Provides a [`Journal`] for recording the order callbacks fire in, a
//! [`RecordingAuthenticator`] that remembers logins, and helpers for asserting
//! on error chains.

pub mod authenticator;
pub mod error;
pub mod journal;

pub use authenticator::RecordingAuthenticator;
pub use error::{display_error_chain, story_error};
pub use journal::Journal;
