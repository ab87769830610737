//! Time budget helpers.

use std::time::{Duration, Instant};

/// A point in time after which an operation has exhausted its budget.
///
/// A deadline without an expiry never runs out, which is how
/// a zero or absent timeout is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline which never expires.
    #[must_use]
    pub const fn never() -> Self {
        Self { expires_at: None }
    }

    /// Create a deadline `budget` from now, `None` meaning unbounded.
    #[must_use]
    pub fn after(budget: Option<Duration>) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    /// Create a deadline `budget` from `start`, `None` meaning unbounded.
    ///
    /// A budget too large to be represented is treated as unbounded.
    #[must_use]
    pub fn starting_at(start: Instant, budget: Option<Duration>) -> Self {
        Self {
            expires_at: budget.and_then(|budget| start.checked_add(budget)),
        }
    }

    /// The instant this deadline expires at, if bounded.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether or not this deadline is unbounded.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Time left before expiry.
    ///
    /// `None` means unbounded, `Some(Duration::ZERO)` means expired.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether or not the budget is exhausted.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

/// Interpret a timeout where zero means "no timeout".
#[must_use]
pub fn non_zero_timeout(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_expires() {
        let deadline = Deadline::never();
        assert!(deadline.is_unbounded());
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn past_start_is_expired() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        let deadline = Deadline::starting_at(start, Some(Duration::from_millis(1)));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn remaining_is_bounded_by_budget() {
        let deadline = Deadline::after(Some(Duration::from_secs(10)));
        let left = deadline.remaining().unwrap();
        assert!(left <= Duration::from_secs(10));
        assert!(left > Duration::from_secs(9));
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        assert_eq!(non_zero_timeout(Duration::ZERO), None);
        assert_eq!(
            non_zero_timeout(Duration::from_millis(3)),
            Some(Duration::from_millis(3))
        );
    }
}
