//! Error taxonomy for story composition and execution.
//!
//! Framework failures are reported as [`StoryError`]. Errors raised by user
//! callbacks travel through [`anyhow::Error`] untouched, so callers can
//! downcast to [`StoryError`] when they need to tell the two apart.

// Scoped suppression for version-dependent lint false positives from the
// miette/thiserror derive macros. `#[expect]` cannot be used because the lint
// does not fire on every toolchain.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use miette::Diagnostic;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The kind of named component a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// A repeatable unit of work.
    Action,
    /// A setup routine run while a story boots.
    Scenario,
    /// An alternative test registrar selected by name.
    TestFunction,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Action => "action",
            Self::Scenario => "scenario",
            Self::TestFunction => "story test function",
        })
    }
}

/// Errors raised by the story engine itself.
#[derive(Debug, Error, Diagnostic)]
pub enum StoryError {
    /// A named scenario, action or test function is not registered.
    #[error("The `{name}` {kind} could not be found.")]
    #[diagnostic(
        code(storyboard::registry::not_found),
        help("register it on the suite registry before the story boots")
    )]
    NotFound {
        /// What kind of component was looked up.
        kind: ComponentKind,
        /// The name that failed to resolve.
        name: String,
    },

    /// A scenario was booted without a generator callback.
    #[error("The `{name}` scenario generator callback could not be found.")]
    #[diagnostic(code(storyboard::scenario::generator_missing))]
    GeneratorMissing {
        /// Name of the scenario lacking a generator.
        name: String,
    },

    /// A pending reference resolved to the wrong kind of component.
    #[error("Expected the reference to resolve to the {expected} kind, but it produced {found}.")]
    #[diagnostic(code(storyboard::reference::invalid))]
    InvalidReference {
        /// The component kind the caller asked for.
        expected: ComponentKind,
        /// Description of what was produced instead.
        found: String,
    },

    /// A timer deadline fired before the wrapped task finished.
    #[error("The task exceeded its timeout of {timeout:?} (ran for {taken:?}).")]
    #[diagnostic(code(storyboard::timer::timed_out))]
    Timeout {
        /// The configured limit.
        timeout: Duration,
        /// Time elapsed when the deadline was observed.
        taken: Duration,
    },

    /// A timed-out story stopped before its next step.
    #[error("The story was abandoned after its deadline passed.")]
    #[diagnostic(code(storyboard::story::abandoned))]
    Abandoned,

    /// A callback asked for an argument that was never supplied.
    #[error("The `{name}` argument was not supplied to the callback.")]
    #[diagnostic(code(storyboard::callback::missing_argument))]
    MissingArgument {
        /// The requested argument name.
        name: String,
    },

    /// A supplied argument could not be converted to the requested type.
    #[error("The `{name}` argument could not be converted: {source}")]
    #[diagnostic(code(storyboard::callback::invalid_argument))]
    InvalidArgument {
        /// The requested argument name.
        name: String,
        /// Underlying conversion failure.
        #[source]
        source: serde_json::Error,
    },

    /// The worker executing a timed task panicked.
    #[error("The timed task panicked: {message}")]
    #[diagnostic(code(storyboard::timer::panicked))]
    WorkerPanicked {
        /// The panic payload rendered as text.
        message: String,
    },

    /// The worker thread for a timed task could not be started.
    #[error("The timer worker thread could not be spawned: {source}")]
    #[diagnostic(code(storyboard::timer::spawn))]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Layered suite configuration failed to deserialise.
    #[error("Invalid storyboard configuration: {0}")]
    #[diagnostic(code(storyboard::config::invalid))]
    Config(#[source] Box<ortho_config::figment::Error>),
}

impl StoryError {
    /// Build a [`StoryError::NotFound`] for `kind` and `name`.
    pub fn not_found(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Return `true` when this error reports an expired deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Return `true` when `err` wraps a [`StoryError::Timeout`].
#[must_use]
pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StoryError>()
        .is_some_and(StoryError::is_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ComponentKind::Scenario, "not_found", "The `not_found` scenario could not be found.")]
    #[case(ComponentKind::Action, "missing", "The `missing` action could not be found.")]
    #[case(
        ComponentKind::TestFunction,
        "alt",
        "The `alt` story test function could not be found."
    )]
    fn not_found_messages_name_the_component(
        #[case] kind: ComponentKind,
        #[case] name: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(StoryError::not_found(kind, name).to_string(), expected);
    }

    #[rstest]
    fn timeout_is_detected_through_anyhow() {
        let err = anyhow::Error::from(StoryError::Timeout {
            timeout: Duration::from_millis(5),
            taken: Duration::from_millis(7),
        });
        assert!(is_timeout(&err));
        assert!(!is_timeout(&anyhow::anyhow!("boom")));
    }

    #[rstest]
    fn generator_missing_names_the_scenario() {
        let err = StoryError::GeneratorMissing {
            name: "something_cool".into(),
        };
        assert_eq!(
            err.to_string(),
            "The `something_cool` scenario generator callback could not be found."
        );
    }
}
