//! Units accepted when configuring a deadline.

use std::time::Duration;

/// Granularity of a timeout amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerUnit {
    /// Whole seconds.
    #[default]
    Second,
    /// Milliseconds.
    Millisecond,
    /// Microseconds.
    Microsecond,
}

impl TimerUnit {
    /// Convert `amount` of this unit to a [`Duration`].
    #[must_use]
    pub const fn to_duration(self, amount: u64) -> Duration {
        match self {
            Self::Second => Duration::from_secs(amount),
            Self::Millisecond => Duration::from_millis(amount),
            Self::Microsecond => Duration::from_micros(amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TimerUnit::Second, 2, 2_000_000)]
    #[case(TimerUnit::Millisecond, 2, 2_000)]
    #[case(TimerUnit::Microsecond, 2, 2)]
    fn converts_to_microseconds(#[case] unit: TimerUnit, #[case] amount: u64, #[case] micros: u128) {
        assert_eq!(unit.to_duration(amount).as_micros(), micros);
    }
}
