//! Core types for breath-test device telemetry.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Lifecycle status of a device in the fleet.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new statuses
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
#[non_exhaustive]
pub enum DeviceStatus {
    /// Registered but not yet assigned to anyone.
    New,
    /// Assigned to a user.
    Owner,
    /// Ownership transfer in progress.
    ChangeOwner,
    /// Sent in for repair.
    Repair,
    /// Marked as failed hardware.
    Failed,
}

impl DeviceStatus {
    /// Stable string form used in the database and over the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::New => "new",
            DeviceStatus::Owner => "owner",
            DeviceStatus::ChangeOwner => "change-owner",
            DeviceStatus::Repair => "repair",
            DeviceStatus::Failed => "failed",
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(DeviceStatus::New),
            "owner" => Ok(DeviceStatus::Owner),
            "change-owner" => Ok(DeviceStatus::ChangeOwner),
            "repair" => Ok(DeviceStatus::Repair),
            "failed" => Ok(DeviceStatus::Failed),
            other => Err(ParseError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry reading submitted by a device, after boundary validation.
///
/// `timestamp` is the parsed wall-clock time the device asserts for the
/// measurement; `time_text` preserves the raw text exactly as submitted,
/// since devices in the field have been observed sending timestamps in
/// locally formatted variants that should survive round-trips.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadingSubmission {
    /// Serial number of the submitting device.
    pub serial_number: String,
    /// Wall-clock timestamp asserted by the sender.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Measured value.
    pub value: f64,
    /// Unit of the measured value (e.g. `mg/L`).
    pub unit: String,
    /// Device-reported rolling record counter.
    pub record_number: i64,
    /// Raw original time text as submitted.
    pub time_text: String,
}
