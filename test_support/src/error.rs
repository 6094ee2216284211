//! Error inspection helpers for stable test assertions.

use std::error::Error;
use storyboard::StoryError;

/// Join an error and its sources (outermost first) with `": "`.
///
/// Types like [`anyhow::Error`] can be passed via [`AsRef::as_ref`].
pub fn display_error_chain(e: &(dyn Error + 'static)) -> String {
    let mut current: Option<&(dyn Error + 'static)> = Some(e);
    std::iter::from_fn(|| {
        let err = current?;
        current = err.source();
        Some(err.to_string())
    })
    .collect::<Vec<_>>()
    .join(": ")
}

/// The [`StoryError`] somewhere in `err`'s chain, if any.
#[must_use]
pub fn story_error(err: &anyhow::Error) -> Option<&StoryError> {
    err.chain().find_map(|cause| cause.downcast_ref::<StoryError>())
}
