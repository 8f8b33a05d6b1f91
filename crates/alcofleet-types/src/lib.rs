//! Platform-agnostic types for alcofleet breath-test devices.
//!
//! This crate holds the domain types shared by the store and the HTTP
//! service: the telemetry reading a device submits, the device lifecycle
//! status, and the stateless alcohol-level assessment.
//!
//! # Example
//!
//! ```
//! use alcofleet_types::{RiskLevel, assess_at};
//! use time::OffsetDateTime;
//!
//! let result = assess_at(62.0, OffsetDateTime::UNIX_EPOCH);
//! assert_eq!(result.level, RiskLevel::Danger);
//! assert!(result.wait.is_some());
//! ```

mod assessment;
mod error;
mod types;

pub use assessment::{
    AlcoholAssessment, DANGER_THRESHOLD, MAX_WAIT_HOURS, RiskLevel, WARNING_THRESHOLD, WaitTime,
    assess, assess_at,
};
pub use error::ParseError;
pub use types::{DeviceStatus, ReadingSubmission};
