//! Error types for alcofleet-types.

/// Errors that can occur when parsing domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Unknown device status string.
    #[error("unknown device status: {0}")]
    UnknownStatus(String),
}
