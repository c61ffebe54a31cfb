//! Versioning-policy gate.
//!
//! Trimming is refused while the site has a staged-but-unapplied policy
//! change, and for a cooldown window after the most recent known change.
//! Version counts are in flux right after a policy change, so deleting on
//! top of one risks trimming history the new policy would have kept.
//!
//! The gate is a pure function over the policy snapshot and the per-site
//! record; a blocked run mutates nothing.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::remote::VersionPolicy;
use crate::state::RunState;

/// How long a site stays blocked after a versioning-policy change.
pub const POLICY_COOLDOWN_MINUTES: i64 = 30;

/// Outcome of the policy gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed,

    /// An administrative change is staged but not yet applied.
    PendingChange,

    /// A change landed within the cooldown window.
    CoolingDown {
        since: DateTime<Utc>,
        remaining: Duration,
    },
}

impl GateDecision {
    pub fn is_blocked(&self) -> bool {
        !matches!(self, GateDecision::Proceed)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateDecision::Proceed => write!(f, "policy gate clear"),
            GateDecision::PendingChange => {
                write!(f, "a versioning policy change is pending application")
            }
            GateDecision::CoolingDown { since, remaining } => {
                let minutes = (remaining.num_seconds() + 59) / 60;
                write!(
                    f,
                    "versioning policy changed at {}, cooling down for another {} minute(s)",
                    since.to_rfc3339(),
                    minutes
                )
            }
        }
    }
}

/// Decide whether trimming may proceed under the site's versioning policy.
///
/// The most recent known change wins, whether it comes from the server
/// snapshot or from the per-site record. The window is closed-open: a change
/// exactly `POLICY_COOLDOWN_MINUTES` ago proceeds.
pub fn check(policy: &VersionPolicy, state: Option<&RunState>, now: DateTime<Utc>) -> GateDecision {
    if policy.pending_change {
        return GateDecision::PendingChange;
    }

    let recorded = state.and_then(|s| s.last_policy_change_at);
    let last_change = match (recorded, policy.changed_at) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    if let Some(changed_at) = last_change {
        let cooldown = Duration::minutes(POLICY_COOLDOWN_MINUTES);
        let elapsed = now.signed_duration_since(changed_at);
        if elapsed < cooldown {
            return GateDecision::CoolingDown {
                since: changed_at,
                remaining: cooldown - elapsed,
            };
        }
    }

    GateDecision::Proceed
}
