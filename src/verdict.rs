//! Outcome of one site key check.

use std::fmt;

use crate::verified::VerifiedSiteKey;

/// Result of [`ExtractionCoordinator::obtain_and_check_site_key`](crate::ExtractionCoordinator::obtain_and_check_site_key).
///
/// Only `Verified` exempts the request from filtering. `Rejected` and
/// `NoVerdict` both mean "filter normally"; they are kept apart because a
/// forged key is worth counting separately from a page that simply has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A key was found and the verifier accepted it
    Verified(VerifiedSiteKey),
    /// A key was found but failed the signature or domain check
    Rejected,
    /// No decision could be made
    NoVerdict(NoVerdictReason),
}

impl Verdict {
    /// Returns `true` for [`Verdict::Verified`].
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified(_))
    }

    /// Returns `true` for [`Verdict::Rejected`].
    pub fn is_rejected(&self) -> bool {
        matches!(self, Verdict::Rejected)
    }

    /// Returns the reason when no decision was made.
    pub fn no_verdict_reason(&self) -> Option<NoVerdictReason> {
        match self {
            Verdict::NoVerdict(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Returns the verified key, if any.
    pub fn site_key(&self) -> Option<&VerifiedSiteKey> {
        match self {
            Verdict::Verified(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Verified(_) => write!(f, "verified"),
            Verdict::Rejected => write!(f, "rejected"),
            Verdict::NoVerdict(reason) => write!(f, "no verdict ({})", reason),
        }
    }
}

/// Why a check ended without a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoVerdictReason {
    /// Checks are switched off, or were switched off mid-flight
    Disabled,
    /// The strategy does not handle this kind of request
    NotApplicable,
    /// The strategy found no key, or failed to look for one
    NoKeyPresent,
    /// No verification config has been set
    NotConfigured,
    /// The strategy did not report within the timeout
    Timeout,
    /// A new navigation started while the check was pending
    Navigated,
    /// A newer check for the same session replaced this one
    Superseded,
    /// The page session was destroyed or detached
    SessionGone,
}

impl fmt::Display for NoVerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoVerdictReason::Disabled => "disabled",
            NoVerdictReason::NotApplicable => "not applicable",
            NoVerdictReason::NoKeyPresent => "no key present",
            NoVerdictReason::NotConfigured => "not configured",
            NoVerdictReason::Timeout => "timeout",
            NoVerdictReason::Navigated => "navigated",
            NoVerdictReason::Superseded => "superseded",
            NoVerdictReason::SessionGone => "session gone",
        };
        f.write_str(text)
    }
}
