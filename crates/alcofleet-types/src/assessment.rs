//! Stateless alcohol-level classification.
//!
//! Classifies a numeric alcohol value into a risk level and, for values
//! over the danger threshold, computes how long the subject should wait
//! before retesting: `(value - 50) / 10` hours, split into whole hours
//! and minutes.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Value below which a reading is considered safe.
pub const WARNING_THRESHOLD: f64 = 20.0;
/// Value above which a reading is considered dangerous and a wait time applies.
pub const DANGER_THRESHOLD: f64 = 50.0;
/// Longest wait the calculation will report (one year). Values implying a
/// longer wait are clamped so absurd inputs cannot overflow the duration
/// arithmetic.
pub const MAX_WAIT_HOURS: i64 = 24 * 365;

/// Risk level of an alcohol reading.
///
/// Ordered by severity, so threshold comparisons like
/// `level >= RiskLevel::Warning` work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RiskLevel {
    /// Below the warning threshold.
    Safe,
    /// Between the warning and danger thresholds.
    Warning,
    /// Above the danger threshold.
    Danger,
}

impl RiskLevel {
    /// Human-facing label shown on device displays.
    #[must_use]
    pub fn display_text(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Warning => "WARNING",
            RiskLevel::Danger => "DANGER",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_text())
    }
}

/// Recommended wait before retesting, for dangerous readings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WaitTime {
    /// Whole hours to wait.
    pub hours: i64,
    /// Remaining minutes to wait.
    pub minutes: i64,
    /// Absolute time at which retesting is advised.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub wait_until: OffsetDateTime,
}

/// Result of classifying one alcohol value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AlcoholAssessment {
    /// The assessed value, rounded to a whole number.
    pub value: f64,
    /// Risk classification.
    pub level: RiskLevel,
    /// Display label for the level.
    pub display_text: &'static str,
    /// Wait recommendation; present only for [`RiskLevel::Danger`].
    pub wait: Option<WaitTime>,
}

/// Classify `value` relative to the current wall clock.
#[must_use]
pub fn assess(value: f64) -> AlcoholAssessment {
    assess_at(value, OffsetDateTime::now_utc())
}

/// Classify `value`, computing any wait deadline relative to `now`.
///
/// Taking `now` explicitly keeps the function deterministic for tests.
#[must_use]
pub fn assess_at(value: f64, now: OffsetDateTime) -> AlcoholAssessment {
    let level = if value > DANGER_THRESHOLD {
        RiskLevel::Danger
    } else if value >= WARNING_THRESHOLD {
        RiskLevel::Warning
    } else {
        RiskLevel::Safe
    };

    let wait = (level == RiskLevel::Danger).then(|| {
        let raw_hours = ((value - DANGER_THRESHOLD) / 10.0).min(MAX_WAIT_HOURS as f64);
        let hours = raw_hours.floor() as i64;
        let minutes = ((raw_hours - raw_hours.floor()) * 60.0).round() as i64;
        let wait = Duration::hours(hours) + Duration::minutes(minutes);
        WaitTime {
            hours,
            minutes,
            wait_until: now.checked_add(wait).unwrap_or(now),
        }
    });

    AlcoholAssessment {
        value: value.round(),
        level,
        display_text: level.display_text(),
        wait,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_below_warning_threshold() {
        let result = assess_at(0.0, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.level, RiskLevel::Safe);
        assert_eq!(result.display_text, "SAFE");
        assert!(result.wait.is_none());

        let result = assess_at(19.9, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.level, RiskLevel::Safe);
    }

    #[test]
    fn test_warning_band() {
        let result = assess_at(20.0, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.level, RiskLevel::Warning);
        assert!(result.wait.is_none());

        let result = assess_at(50.0, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.level, RiskLevel::Warning);
    }

    #[test]
    fn test_danger_above_threshold() {
        let result = assess_at(50.1, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.level, RiskLevel::Danger);
        assert_eq!(result.display_text, "DANGER");
        assert!(result.wait.is_some());
    }

    #[test]
    fn test_wait_time_split() {
        // (75 - 50) / 10 = 2.5 hours -> 2h 30m
        let result = assess_at(75.0, OffsetDateTime::UNIX_EPOCH);
        let wait = result.wait.unwrap();
        assert_eq!(wait.hours, 2);
        assert_eq!(wait.minutes, 30);
        assert_eq!(
            wait.wait_until,
            OffsetDateTime::UNIX_EPOCH + Duration::minutes(150)
        );
    }

    #[test]
    fn test_wait_time_whole_hours() {
        // (80 - 50) / 10 = 3.0 hours -> 3h 0m
        let wait = assess_at(80.0, OffsetDateTime::UNIX_EPOCH).wait.unwrap();
        assert_eq!(wait.hours, 3);
        assert_eq!(wait.minutes, 0);
    }

    #[test]
    fn test_wait_time_clamped_for_extreme_values() {
        // Implausibly large readings must not overflow the duration math.
        let wait = assess_at(1.0e18, OffsetDateTime::UNIX_EPOCH).wait.unwrap();
        assert_eq!(wait.hours, MAX_WAIT_HOURS);
        assert_eq!(wait.minutes, 0);
        assert_eq!(
            wait.wait_until,
            OffsetDateTime::UNIX_EPOCH + Duration::hours(MAX_WAIT_HOURS)
        );

        let wait = assess_at(f64::MAX, OffsetDateTime::UNIX_EPOCH).wait.unwrap();
        assert_eq!(wait.hours, MAX_WAIT_HOURS);
    }

    #[test]
    fn test_value_rounding() {
        let result = assess_at(62.6, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.value, 63.0);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Danger > RiskLevel::Warning);
        assert!(RiskLevel::Warning > RiskLevel::Safe);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_assessment_serialization() {
        let result = assess_at(62.0, OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"danger\""));
        assert!(json.contains("DANGER"));
        assert!(json.contains("wait_until"));
    }
}
