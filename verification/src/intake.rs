//! Issue intake: validating a report before anything is written.

use crate::error::EngineError;
use civic_types::{Category, Coordinates, EngineParams, Severity};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const TITLE_CHARS: RangeInclusive<usize> = 5..=100;
pub const QUESTION_CHARS: RangeInclusive<usize> = 10..=200;

/// A report as submitted by a resident.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub question: String,
    pub category: Category,
    pub severity: Severity,
    pub location: Coordinates,
    /// Overrides the severity's default radius.
    #[serde(default)]
    pub radius_meters: Option<f64>,
    /// Overrides the severity's default threshold.
    #[serde(default)]
    pub vote_threshold: Option<u32>,
}

/// A report that passed validation, with defaults resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedIssue {
    pub title: String,
    pub question: String,
    pub category: Category,
    pub severity: Severity,
    pub origin: Coordinates,
    pub radius_meters: f64,
    pub vote_threshold: u32,
    pub window_secs: u64,
}

fn check_length(field: &str, value: &str, bounds: RangeInclusive<usize>) -> Result<(), EngineError> {
    let len = value.chars().count();
    if !bounds.contains(&len) {
        return Err(EngineError::InvalidIssue(format!(
            "{field} must be {}-{} characters, got {len}",
            bounds.start(),
            bounds.end()
        )));
    }
    Ok(())
}

impl NewIssue {
    pub fn validate(&self, params: &EngineParams) -> Result<ValidatedIssue, EngineError> {
        let title = self.title.trim();
        let question = self.question.trim();
        check_length("title", title, TITLE_CHARS)?;
        check_length("question", question, QUESTION_CHARS)?;

        if !self.location.is_valid() {
            return Err(EngineError::InvalidLocation(self.location));
        }

        let profile = params.profile(self.severity);

        let radius_meters = match self.radius_meters {
            Some(r) if !(r.is_finite() && r > 0.0) => {
                return Err(EngineError::InvalidIssue(
                    "radius_meters must be positive".into(),
                ));
            }
            Some(r) if r > params.max_radius_meters => {
                return Err(EngineError::InvalidIssue(format!(
                    "radius_meters may not exceed {}",
                    params.max_radius_meters
                )));
            }
            Some(r) => r,
            None => profile.radius_meters,
        };

        let vote_threshold = match self.vote_threshold {
            Some(0) => {
                return Err(EngineError::InvalidIssue(
                    "vote_threshold must be at least 1".into(),
                ));
            }
            Some(t) => t,
            None => profile.threshold,
        };

        Ok(ValidatedIssue {
            title: title.to_string(),
            question: question.to_string(),
            category: self.category,
            severity: self.severity,
            origin: self.location,
            radius_meters,
            vote_threshold,
            window_secs: profile.window_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> NewIssue {
        NewIssue {
            title: "Water outage".into(),
            question: "Is your tap running dry?".into(),
            category: Category::Water,
            severity: Severity::Medium,
            location: Coordinates::new(-1.3, 36.8),
            radius_meters: None,
            vote_threshold: None,
        }
    }

    #[test]
    fn defaults_come_from_severity() {
        let params = EngineParams::default();
        let v = report().validate(&params).unwrap();
        assert_eq!(v.vote_threshold, 10);
        assert_eq!(v.radius_meters, params.medium.radius_meters);
        assert_eq!(v.window_secs, 3 * 24 * 3600);
    }

    #[test]
    fn overrides_win() {
        let mut r = report();
        r.radius_meters = Some(250.0);
        r.vote_threshold = Some(3);
        let v = r.validate(&EngineParams::default()).unwrap();
        assert_eq!(v.radius_meters, 250.0);
        assert_eq!(v.vote_threshold, 3);
    }

    #[test]
    fn title_length_enforced_after_trim() {
        let mut r = report();
        r.title = "  abc  ".into();
        assert!(matches!(
            r.validate(&EngineParams::default()),
            Err(EngineError::InvalidIssue(_))
        ));
        r.title = "x".repeat(101);
        assert!(r.validate(&EngineParams::default()).is_err());
        r.title = "x".repeat(100);
        assert!(r.validate(&EngineParams::default()).is_ok());
    }

    #[test]
    fn question_length_counts_characters_not_bytes() {
        let mut r = report();
        r.question = "é".repeat(200);
        assert!(r.validate(&EngineParams::default()).is_ok());
        r.question = "short?".into();
        assert!(r.validate(&EngineParams::default()).is_err());
    }

    #[test]
    fn bad_overrides_rejected() {
        let params = EngineParams::default();
        let mut r = report();
        r.vote_threshold = Some(0);
        assert!(r.validate(&params).is_err());

        let mut r = report();
        r.radius_meters = Some(-5.0);
        assert!(r.validate(&params).is_err());

        let mut r = report();
        r.radius_meters = Some(params.max_radius_meters + 1.0);
        assert!(r.validate(&params).is_err());
    }

    #[test]
    fn bad_location_rejected() {
        let mut r = report();
        r.location = Coordinates::new(0.0, 200.0);
        assert!(matches!(
            r.validate(&EngineParams::default()),
            Err(EngineError::InvalidLocation(_))
        ));
    }
}
