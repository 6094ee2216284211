//! Repeat-count policy for actions.

/// How many times an action runs and how many times it has run so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    limit: u32,
    times_run: u32,
}

impl Default for Repeat {
    fn default() -> Self {
        Self::once()
    }
}

impl Repeat {
    /// Run exactly once.
    #[must_use]
    pub const fn once() -> Self {
        Self::times(1)
    }

    /// Run `limit` times; zero disables the action.
    #[must_use]
    pub const fn times(limit: u32) -> Self {
        Self {
            limit,
            times_run: 0,
        }
    }

    /// Report whether another iteration is allowed.
    #[must_use]
    pub const fn should_run(&self) -> bool {
        self.times_run < self.limit
    }

    /// Count one started iteration.
    pub const fn increment(&mut self) {
        self.times_run = self.times_run.saturating_add(1);
    }

    /// Iterations started so far.
    #[must_use]
    pub const fn times_run(&self) -> u32 {
        self.times_run
    }

    /// The configured iteration count.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Forget past iterations, keeping the limit.
    pub const fn reset(&mut self) {
        self.times_run = 0;
    }
}
