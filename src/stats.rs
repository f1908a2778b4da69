//! Verdict counters.
//!
//! Every finished check is counted once, by the thread that returns its
//! verdict. Results thrown away after their caller was released (stale
//! generation, superseded, disabled mid-flight) are counted separately so a
//! host can tell how often late work is wasted.

use parking_lot::Mutex;

use crate::verdict::{NoVerdictReason, Verdict};

/// Point-in-time copy of the counters.
///
/// # Example
///
/// ```
/// use sitekey_core::StatsSnapshot;
///
/// let snapshot = StatsSnapshot::default();
/// assert_eq!(snapshot.total_checks(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Checks that returned `Verified`
    pub verified: u64,
    /// Checks that returned `Rejected`
    pub rejected: u64,
    /// Checks that found no key
    pub no_key_present: u64,
    /// Checks that hit the wait bound
    pub timed_out: u64,
    /// Checks released by a new navigation
    pub navigated: u64,
    /// Checks replaced by a newer one for the same session
    pub superseded: u64,
    /// Checks skipped or cut short because checking was disabled
    pub disabled: u64,
    /// Checks for requests the strategy does not handle
    pub not_applicable: u64,
    /// Checks made without a verification config
    pub not_configured: u64,
    /// Checks whose session was destroyed or detached
    pub session_gone: u64,
    /// Late results dropped because their check was already released
    pub discarded_stale: u64,
    /// Results dropped because checking was disabled before they resolved
    pub discarded_disabled: u64,
}

impl StatsSnapshot {
    /// Number of checks that returned a verdict.
    pub fn total_checks(&self) -> u64 {
        self.verified
            + self.rejected
            + self.no_key_present
            + self.timed_out
            + self.navigated
            + self.superseded
            + self.disabled
            + self.not_applicable
            + self.not_configured
            + self.session_gone
    }
}

/// Shared counters owned by a coordinator.
#[derive(Debug, Default)]
pub(crate) struct ExtractionStats {
    counters: Mutex<StatsSnapshot>,
}

impl ExtractionStats {
    /// Counts a verdict returned to a caller.
    pub(crate) fn record(&self, verdict: &Verdict) {
        let mut counters = self.counters.lock();
        match verdict {
            Verdict::Verified(_) => counters.verified += 1,
            Verdict::Rejected => counters.rejected += 1,
            Verdict::NoVerdict(reason) => match reason {
                NoVerdictReason::NoKeyPresent => counters.no_key_present += 1,
                NoVerdictReason::Timeout => counters.timed_out += 1,
                NoVerdictReason::Navigated => counters.navigated += 1,
                NoVerdictReason::Superseded => counters.superseded += 1,
                NoVerdictReason::Disabled => counters.disabled += 1,
                NoVerdictReason::NotApplicable => counters.not_applicable += 1,
                NoVerdictReason::NotConfigured => counters.not_configured += 1,
                NoVerdictReason::SessionGone => counters.session_gone += 1,
            },
        }
    }

    pub(crate) fn discard_stale(&self) {
        self.counters.lock().discarded_stale += 1;
    }

    pub(crate) fn discard_disabled(&self) {
        self.counters.lock().discarded_disabled += 1;
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock()
    }
}
