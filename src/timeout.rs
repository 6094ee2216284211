//! Tri-state timeout configuration.

use crate::timer::TimerUnit;
use std::time::Duration;

/// Timeout as configured on a single story or action.
///
/// `Inherit` means the node never touched its timeout and defers to its
/// ancestors; `Disabled` explicitly removes any inherited limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Not configured on this node.
    #[default]
    Inherit,
    /// Explicitly disabled.
    Disabled,
    /// Explicitly limited to the given duration.
    Limit(Duration),
}

impl Timeout {
    /// Build a limit of `amount` in `unit`.
    #[must_use]
    pub const fn of(amount: u64, unit: TimerUnit) -> Self {
        Self::Limit(unit.to_duration(amount))
    }

    /// Report whether this node set or disabled the timeout itself.
    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        !matches!(self, Self::Inherit)
    }

    /// The effective limit, if any.
    #[must_use]
    pub const fn limit(self) -> Option<Duration> {
        match self {
            Self::Limit(duration) => Some(duration),
            Self::Inherit | Self::Disabled => None,
        }
    }

    /// Replace `Inherit` with `fallback`, leaving explicit settings alone.
    #[must_use]
    pub const fn or(self, fallback: Self) -> Self {
        match self {
            Self::Inherit => fallback,
            explicit @ (Self::Disabled | Self::Limit(_)) => explicit,
        }
    }
}
