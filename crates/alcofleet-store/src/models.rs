//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use alcofleet_types::DeviceStatus;

/// A device stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Internal row ID.
    pub id: i64,
    /// Externally-assigned unique serial number.
    pub serial_number: String,
    /// Hardware-reported device identifier, if synced.
    pub device_id: Option<String>,
    /// Friendly name.
    pub name: Option<String>,
    /// Hardware model.
    pub model: Option<String>,
    /// Lifecycle status.
    pub status: DeviceStatus,
    /// Owning user, if assigned.
    pub user_id: Option<i64>,
    /// When the device was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
    /// When the device was soft-deleted, if it was.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

/// Fields for registering a new device.
#[derive(Debug, Clone, Default)]
pub struct NewDevice {
    pub serial_number: String,
    pub device_id: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
}

/// A user stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    /// Internal row ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An immutable telemetry record in the append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Database row ID.
    pub id: i64,
    /// Internal ID of the device that produced the record.
    pub device_id: i64,
    /// Wall-clock timestamp asserted by the sender.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Measured value.
    pub value: f64,
    /// Unit of the measured value.
    pub unit: String,
    /// Device-reported rolling record counter.
    pub record_number: i64,
    /// Session the record belongs to.
    pub session_id: String,
    /// Raw original time text as submitted.
    pub time_text: String,
    /// When the record was accepted by the server.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// Per-device snapshot of the most recently accepted reading.
///
/// At most one row exists per device; it is created on the first accepted
/// reading and replaced on every later one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestState {
    /// Internal ID of the device.
    pub device_id: i64,
    /// Timestamp of the most recently accepted reading.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Record counter of the most recently accepted reading.
    pub record_number: i64,
    /// Session of the most recently accepted reading.
    pub session_id: String,
}
