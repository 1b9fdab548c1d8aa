//! Engine parameters: the severity table plus the scheduler and concurrency knobs.
//!
//! Loaded from the `[engine]` table of the node configuration; every field has
//! a default so a partial table is valid.

use crate::error::TypeError;
use crate::issue::Severity;
use serde::{Deserialize, Serialize};

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Defaults applied to a new issue of a given severity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeverityProfile {
    /// Yes-votes needed to move from `active` to `verified`.
    pub threshold: u32,
    /// Initial geofence radius in meters.
    pub radius_meters: f64,
    /// Length of each expiry window (initial and after every repost).
    pub window_secs: u64,
}

/// How critical issues reach `verified`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalPolicy {
    /// Verified at creation, no votes needed.
    Immediate,
    /// Verified on the first yes-vote from someone other than the reporter.
    FirstCorroboration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    // ── Severity table ───────────────────────────────────────────────────
    pub critical: SeverityProfile,
    pub high: SeverityProfile,
    pub medium: SeverityProfile,
    pub low: SeverityProfile,

    // ── Repost ───────────────────────────────────────────────────────────
    /// Reposting stops once the radius reaches this value.
    pub max_radius_meters: f64,
    /// Radius multiplier applied on each repost (clamped to the maximum).
    pub radius_expansion_factor: f64,

    // ── Escalation ───────────────────────────────────────────────────────
    /// Re-escalations of an unacknowledged verified issue before it expires.
    pub max_escalations: u32,

    // ── Concurrency ──────────────────────────────────────────────────────
    /// Extra attempts after a lost optimistic write before surfacing
    /// `PersistenceConflict`.
    pub max_conflict_retries: u32,

    // ── Reporter rules ───────────────────────────────────────────────────
    /// Record the reporter's own report as an implicit yes-vote.
    pub count_reporter_corroboration: bool,
    /// Let reporters vote on their own issues.
    pub allow_reporter_vote: bool,
    pub critical_policy: CriticalPolicy,
}

impl EngineParams {
    pub fn profile(&self, severity: Severity) -> &SeverityProfile {
        match severity {
            Severity::Critical => &self.critical,
            Severity::High => &self.high,
            Severity::Medium => &self.medium,
            Severity::Low => &self.low,
        }
    }

    /// Reject parameter sets the engine cannot honour.
    pub fn validate(&self) -> Result<(), TypeError> {
        let invalid = |msg: String| Err(TypeError::InvalidParams(msg));
        // NaN would make every "below the cap" comparison false.
        if !(self.max_radius_meters.is_finite() && self.max_radius_meters > 0.0) {
            return invalid("max_radius_meters must be positive".into());
        }
        for severity in Severity::ALL {
            let p = self.profile(*severity);
            if p.threshold == 0 {
                return invalid(format!("{severity} threshold must be at least 1"));
            }
            if p.window_secs == 0 {
                return invalid(format!("{severity} window must be at least 1 second"));
            }
            if !(p.radius_meters.is_finite() && p.radius_meters > 0.0) {
                return invalid(format!("{severity} radius must be positive"));
            }
            if p.radius_meters > self.max_radius_meters {
                return invalid(format!("{severity} radius exceeds max_radius_meters"));
            }
        }
        if !(self.radius_expansion_factor.is_finite() && self.radius_expansion_factor > 1.0) {
            return invalid("radius_expansion_factor must be greater than 1".into());
        }
        Ok(())
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            critical: SeverityProfile {
                threshold: 1,
                radius_meters: 500.0,
                window_secs: HOUR,
            },
            high: SeverityProfile {
                threshold: 5,
                radius_meters: 1_000.0,
                window_secs: DAY,
            },
            medium: SeverityProfile {
                threshold: 10,
                radius_meters: 1_000.0,
                window_secs: 3 * DAY,
            },
            low: SeverityProfile {
                threshold: 15,
                radius_meters: 2_000.0,
                window_secs: 7 * DAY,
            },
            max_radius_meters: 8_000.0,
            radius_expansion_factor: 1.5,
            max_escalations: 3,
            max_conflict_retries: 3,
            count_reporter_corroboration: false,
            allow_reporter_vote: false,
            critical_policy: CriticalPolicy::Immediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_severity_table() {
        let params = EngineParams::default();
        assert_eq!(params.profile(Severity::High).threshold, 5);
        assert_eq!(params.profile(Severity::Medium).threshold, 10);
        assert_eq!(params.profile(Severity::Low).threshold, 15);
        assert_eq!(params.profile(Severity::High).window_secs, 24 * 3600);
        assert_eq!(params.profile(Severity::Medium).window_secs, 3 * 24 * 3600);
        assert_eq!(params.profile(Severity::Low).window_secs, 7 * 24 * 3600);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut params = EngineParams::default();
        params.low.threshold = 0;
        assert!(matches!(params.validate(), Err(TypeError::InvalidParams(_))));
    }

    #[test]
    fn unusable_max_radius_rejected() {
        for max in [f64::NAN, f64::INFINITY, 0.0, -1.0] {
            let params = EngineParams {
                max_radius_meters: max,
                ..EngineParams::default()
            };
            assert!(
                matches!(params.validate(), Err(TypeError::InvalidParams(_))),
                "accepted max radius {max}"
            );
        }
    }

    #[test]
    fn zero_window_rejected() {
        let mut params = EngineParams::default();
        params.high.window_secs = 0;
        assert!(matches!(params.validate(), Err(TypeError::InvalidParams(_))));
    }

    #[test]
    fn non_expanding_factor_rejected() {
        let mut params = EngineParams::default();
        params.radius_expansion_factor = 1.0;
        assert!(params.validate().is_err());
    }
}
