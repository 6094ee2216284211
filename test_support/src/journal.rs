//! Ordered log of the callbacks a story fired.

use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use storyboard::{CallbackResult, Invocation};

/// Shared, clonable list of entries appended by callbacks.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Callback that appends `entry` and returns it as its value.
    #[must_use]
    pub fn note(
        &self,
        entry: &str,
    ) -> impl Fn(&mut Invocation<'_>) -> CallbackResult + Send + Sync + use<> {
        let journal = self.clone();
        let entry = entry.to_owned();
        move |_| {
            journal.push(entry.clone());
            Ok(json!(entry))
        }
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn clones_share_entries() {
        let journal = Journal::new();
        let other = journal.clone();
        journal.push("one");
        other.push("two");
        assert_eq!(journal.entries(), ["one", "two"]);
        other.clear();
        assert!(journal.entries().is_empty());
    }
}
