//! Bounded cooperative waiting.
//!
//! The host streams assets asynchronously, and the simulation must never block
//! a frame waiting for them.  A [`BoundedWait`] is polled once per frame with
//! the current readiness; it reports [`WaitStatus::Pending`] until either the
//! condition holds or the poll budget runs out.  Callers treat a timeout as
//! "proceed degraded", never as a hard failure.

use crate::error::TornadoError;

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Pending,
    Ready,
    TimedOut,
}

/// A poll counter with a fixed budget.  One poll per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedWait {
    attempts: u32,
    max_attempts: u32,
}

impl BoundedWait {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Records one poll.  Failed polls count against the budget; the poll that
    /// exhausts it reports `TimedOut`.  Once timed out, stays timed out.
    pub fn poll(&mut self, ready: bool) -> WaitStatus {
        if self.is_exhausted() {
            return WaitStatus::TimedOut;
        }
        if ready {
            return WaitStatus::Ready;
        }
        self.attempts += 1;
        if self.is_exhausted() {
            WaitStatus::TimedOut
        } else {
            WaitStatus::Pending
        }
    }

    /// [`poll`](Self::poll) with a lazily evaluated condition.  The predicate
    /// is not called once the budget is spent.
    pub fn poll_with(&mut self, ready: impl FnOnce() -> bool) -> WaitStatus {
        if self.is_exhausted() {
            return WaitStatus::TimedOut;
        }
        self.poll(ready())
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Describes this wait running out while `asset` was still streaming.
    pub fn timeout_error(&self, asset: &str) -> TornadoError {
        TornadoError::AssetTimeout {
            asset: asset.to_string(),
            attempts: self.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_condition_reports_ready_without_spending_budget() {
        let mut wait = BoundedWait::new(3);
        assert_eq!(wait.poll(true), WaitStatus::Ready);
        assert_eq!(wait.attempts(), 0);
    }

    #[test]
    fn budget_exhaustion_times_out_on_last_poll() {
        let mut wait = BoundedWait::new(3);
        assert_eq!(wait.poll(false), WaitStatus::Pending);
        assert_eq!(wait.poll(false), WaitStatus::Pending);
        assert_eq!(wait.poll(false), WaitStatus::TimedOut);
        // Late readiness does not resurrect an expired wait.
        assert_eq!(wait.poll(true), WaitStatus::TimedOut);
    }

    #[test]
    fn predicate_skipped_after_timeout() {
        let mut wait = BoundedWait::new(1);
        assert_eq!(wait.poll(false), WaitStatus::TimedOut);
        let status = wait.poll_with(|| panic!("predicate must not run"));
        assert_eq!(status, WaitStatus::TimedOut);
    }

    #[test]
    fn timeout_error_names_asset_and_spent_polls() {
        let mut wait = BoundedWait::new(2);
        wait.poll(false);
        wait.poll(false);
        let err = wait.timeout_error("core");
        assert_eq!(
            err,
            TornadoError::AssetTimeout {
                asset: "core".to_string(),
                attempts: 2,
            }
        );
        assert_eq!(err.to_string(), "asset 'core' did not load within 2 polls");
    }

    #[test]
    fn zero_budget_times_out_immediately() {
        let mut wait = BoundedWait::new(0);
        assert_eq!(wait.poll(true), WaitStatus::TimedOut);
    }
}
