//! Telemetry ingestion engine.
//!
//! Devices upload readings over plain HTTP with no ordering guarantees:
//! retries, batched backfills, and concurrent uploads from the same unit all
//! happen in practice. The engine makes each submission safe to apply by
//! serializing per device and comparing against the last accepted reading.
//!
//! # Acceptance rules
//!
//! For a device with a recorded latest state, a submission is:
//!
//! - **skipped as identical** when both its record counter and timestamp
//!   equal the stored ones (a retry of the last accepted reading),
//! - **skipped as stale** when its timestamp is at or before the stored one,
//! - **accepted** otherwise. An accepted reading continues the current
//!   session, unless its record counter moved backwards (the device's
//!   rolling counter reset), in which case a fresh session is minted.
//!
//! The very first reading from a device always starts a new session.
//!
//! # Concurrency
//!
//! Submissions for the same serial number are serialized through a per-device
//! lock held from the state read through the transactional write, so the
//! read-decide-write sequence is never interleaved. Devices never contend
//! with each other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use alcofleet_store::{LatestState, Store, StoredRecord};
use alcofleet_types::ReadingSubmission;

/// Registry of per-device exclusion locks.
///
/// Locks are created on first use and kept for the lifetime of the registry;
/// one entry per serial number ever seen, which for a bounded fleet is a
/// bounded map.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a serial number, creating it if needed.
    ///
    /// The returned guard keeps the lock held until dropped.
    pub async fn acquire(&self, serial: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(
                locks
                    .entry(serial.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of serials with a registered lock.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Result of submitting a reading.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The reading was accepted and durably recorded.
    Accepted(StoredRecord),
    /// The reading repeats the last accepted one and was dropped.
    SkippedIdentical,
    /// The reading is not newer than the last accepted one and was dropped.
    SkippedStale,
}

/// Result of a bulk backfill submission.
#[derive(Debug)]
pub struct BackfillOutcome {
    /// Readings inserted into history.
    pub inserted: usize,
    /// Readings dropped as already present.
    pub skipped: usize,
}

/// Errors from the ingestion engine.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// No registered device matches the submitted serial number.
    #[error("Device not found: {0}")]
    UnknownDevice(String),

    /// The underlying store failed.
    #[error(transparent)]
    Store(#[from] alcofleet_store::Error),
}

/// What to do with a submission, relative to the stored latest state.
#[derive(Debug, PartialEq)]
enum Decision {
    SkipIdentical,
    SkipStale,
    NewSession,
    ContinueSession(String),
}

/// Pure acceptance decision. Must be evaluated under the device's lock.
fn decide(state: Option<&LatestState>, reading: &ReadingSubmission) -> Decision {
    let Some(state) = state else {
        return Decision::NewSession;
    };

    if reading.record_number == state.record_number && reading.timestamp == state.timestamp {
        return Decision::SkipIdentical;
    }

    if reading.timestamp <= state.timestamp {
        return Decision::SkipStale;
    }

    // Newer reading with a smaller counter means the device's rolling
    // record counter wrapped or reset
    if reading.record_number < state.record_number {
        Decision::NewSession
    } else {
        Decision::ContinueSession(state.session_id.clone())
    }
}

/// The ingestion engine: a lock registry plus the acceptance algorithm.
///
/// The engine does not own the store; handlers pass it in per call so the
/// same engine instance can be shared wherever the application state lives.
#[derive(Debug, Default)]
pub struct IngestEngine {
    locks: LockRegistry,
}

impl IngestEngine {
    /// Create a new engine with an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the lock registry (used by status reporting).
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Submit a reading for ingestion.
    ///
    /// Holds the device's exclusion lock across the whole read-decide-write
    /// sequence. The store mutex itself is only held for the individual
    /// store calls, so other devices' submissions and unrelated queries
    /// interleave freely.
    pub async fn submit(
        &self,
        store: &Mutex<Store>,
        reading: ReadingSubmission,
    ) -> Result<IngestOutcome, IngestError> {
        let _guard = self.locks.acquire(&reading.serial_number).await;

        let (device, state) = {
            let store = store.lock().await;
            store
                .get_device_with_state(&reading.serial_number)?
                .ok_or_else(|| IngestError::UnknownDevice(reading.serial_number.clone()))?
        };

        let session_id = match decide(state.as_ref(), &reading) {
            Decision::SkipIdentical => {
                debug!(
                    "Skipping identical record {} from {}",
                    reading.record_number, reading.serial_number
                );
                return Ok(IngestOutcome::SkippedIdentical);
            }
            Decision::SkipStale => {
                debug!(
                    "Skipping stale record {} from {}",
                    reading.record_number, reading.serial_number
                );
                return Ok(IngestOutcome::SkippedStale);
            }
            Decision::NewSession => {
                let session_id = Uuid::new_v4().to_string();
                info!(
                    "Starting session {} for device {}",
                    session_id, reading.serial_number
                );
                session_id
            }
            Decision::ContinueSession(session_id) => session_id,
        };

        let record = {
            let mut store = store.lock().await;
            store.ingest_accepted(device.id, &reading, &session_id)?
        };

        Ok(IngestOutcome::Accepted(record))
    }

    /// Submit a batch of historical readings for a single device.
    ///
    /// Backfill restores gaps in history after an outage: readings whose
    /// record number or timestamp already appears in the device's history
    /// are dropped, the rest are inserted in one transaction under the
    /// provided session (a fresh one is minted when none is given). The
    /// latest-state row is never touched, so the live acceptance algorithm
    /// is unaffected by what a backfill inserts.
    pub async fn backfill(
        &self,
        store: &Mutex<Store>,
        serial: &str,
        session_id: Option<String>,
        readings: Vec<ReadingSubmission>,
    ) -> Result<BackfillOutcome, IngestError> {
        let _guard = self.locks.acquire(serial).await;

        let (device, existing) = {
            let store = store.lock().await;
            let device = store
                .get_device_by_serial(serial)?
                .ok_or_else(|| IngestError::UnknownDevice(serial.to_string()))?;
            let existing = store.record_keys(device.id)?;
            (device, existing)
        };

        let seen_numbers: HashSet<i64> = existing.iter().map(|(n, _)| *n).collect();
        let seen_timestamps: HashSet<_> = existing.iter().map(|(_, ts)| *ts).collect();

        let total = readings.len();
        let fresh: Vec<ReadingSubmission> = readings
            .into_iter()
            .filter(|r| {
                !seen_numbers.contains(&r.record_number)
                    && !seen_timestamps.contains(&r.timestamp)
            })
            .collect();
        let skipped = total - fresh.len();

        if fresh.is_empty() {
            debug!("Backfill for {} had no new records", serial);
            return Ok(BackfillOutcome { inserted: 0, skipped });
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let inserted = {
            let mut store = store.lock().await;
            store.insert_backfill(device.id, &fresh, &session_id)?
        };

        info!(
            "Backfilled {} records for device {} ({} skipped)",
            inserted, serial, skipped
        );
        Ok(BackfillOutcome { inserted, skipped })
    }
}
