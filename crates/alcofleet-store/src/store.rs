//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use alcofleet_types::{DeviceStatus, ReadingSubmission};

use crate::error::{Error, Result};
use crate::models::{LatestState, NewDevice, StoredDevice, StoredRecord, StoredUser};
use crate::queries::{DevicePage, DeviceQuery, RecordQuery};
use crate::schema;

/// SQLite-based store for the alcofleet backend.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better performance
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        // Initialize schema
        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

/// Timestamps are stored as unix milliseconds; devices report sub-minute
/// cadences and the acceptance check compares exact submitted times.
fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).unwrap()
}

fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredDevice> {
    Ok(StoredDevice {
        id: row.get(0)?,
        serial_number: row.get(1)?,
        device_id: row.get(2)?,
        name: row.get(3)?,
        model: row.get(4)?,
        status: row
            .get::<_, String>(5)?
            .parse()
            .unwrap_or(DeviceStatus::New),
        user_id: row.get(6)?,
        registered_at: from_millis(row.get(7)?),
        deleted_at: row.get::<_, Option<i64>>(8)?.map(from_millis),
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        timestamp: from_millis(row.get(2)?),
        value: row.get(3)?,
        unit: row.get(4)?,
        record_number: row.get(5)?,
        session_id: row.get(6)?,
        time_text: row.get(7)?,
        recorded_at: from_millis(row.get(8)?),
    })
}

const DEVICE_COLUMNS: &str =
    "id, serial_number, device_id, name, model, status, user_id, registered_at, deleted_at";

// === Device operations ===
impl Store {
    /// Register a new device. The serial number must not already exist.
    pub fn create_device(&self, device: &NewDevice) -> Result<StoredDevice> {
        let now = to_millis(OffsetDateTime::now_utc());

        self.conn.execute(
            "INSERT INTO devices (serial_number, device_id, name, model, status, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                device.serial_number,
                device.device_id,
                device.name,
                device.model,
                DeviceStatus::New.as_str(),
                now
            ],
        )?;

        self.get_device_by_serial(&device.serial_number)?
            .ok_or_else(|| Error::DeviceNotFound(device.serial_number.clone()))
    }

    /// Get a device by serial number.
    pub fn get_device_by_serial(&self, serial: &str) -> Result<Option<StoredDevice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE serial_number = ?"
        ))?;

        let device = stmt.query_row([serial], device_from_row).optional()?;
        Ok(device)
    }

    /// Get a device by serial number together with its latest state, in one call.
    ///
    /// This is the lookup the ingestion engine uses: one query resolves both
    /// the device identity and the last-accepted-reading snapshot.
    pub fn get_device_with_state(
        &self,
        serial: &str,
    ) -> Result<Option<(StoredDevice, Option<LatestState>)>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT d.id, d.serial_number, d.device_id, d.name, d.model, d.status,
                    d.user_id, d.registered_at, d.deleted_at,
                    s.timestamp, s.record_number, s.session_id
             FROM devices d
             LEFT JOIN latest_state s ON s.device_id = d.id
             WHERE d.serial_number = ?"
        ))?;

        let result = stmt
            .query_row([serial], |row| {
                let device = device_from_row(row)?;
                let state = match row.get::<_, Option<i64>>(9)? {
                    Some(ts) => Some(LatestState {
                        device_id: device.id,
                        timestamp: from_millis(ts),
                        record_number: row.get(10)?,
                        session_id: row.get(11)?,
                    }),
                    None => None,
                };
                Ok((device, state))
            })
            .optional()?;

        Ok(result)
    }

    /// Query the device directory with search, status filter, and pagination.
    pub fn query_devices(&self, query: &DeviceQuery) -> Result<DevicePage> {
        let (where_clause, params) = query.build_where();
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let total_items: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM devices {}", where_clause),
            params_ref.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices {} ORDER BY id DESC LIMIT {} OFFSET {}",
            where_clause,
            query.per_page,
            query.sql_offset()
        );
        debug!("Executing query: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_ref.as_slice(), device_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DevicePage {
            items,
            total_items: total_items as u64,
            page: query.page,
            per_page: query.per_page,
        })
    }

    /// Update the mutable identity fields of a device. `None` fields are left unchanged.
    pub fn update_device(
        &self,
        serial: &str,
        name: Option<&str>,
        model: Option<&str>,
        device_id: Option<&str>,
        status: Option<DeviceStatus>,
    ) -> Result<StoredDevice> {
        let changed = self.conn.execute(
            "UPDATE devices SET
                name = COALESCE(?2, name),
                model = COALESCE(?3, model),
                device_id = COALESCE(?4, device_id),
                status = COALESCE(?5, status)
             WHERE serial_number = ?1",
            rusqlite::params![serial, name, model, device_id, status.map(|s| s.as_str())],
        )?;

        if changed == 0 {
            return Err(Error::DeviceNotFound(serial.to_string()));
        }

        self.get_device_by_serial(serial)?
            .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))
    }

    /// Set only the lifecycle status of a device.
    pub fn update_device_status(&self, serial: &str, status: DeviceStatus) -> Result<StoredDevice> {
        self.update_device(serial, None, None, None, Some(status))
    }

    /// Hard-delete a device and everything it produced.
    pub fn delete_device(&mut self, serial: &str) -> Result<()> {
        let tx = self.conn.transaction()?;

        let device_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM devices WHERE serial_number = ?",
                [serial],
                |row| row.get(0),
            )
            .optional()?;

        let Some(device_id) = device_id else {
            return Err(Error::DeviceNotFound(serial.to_string()));
        };

        tx.execute("DELETE FROM latest_state WHERE device_id = ?", [device_id])?;
        tx.execute("DELETE FROM data_records WHERE device_id = ?", [device_id])?;
        tx.execute("DELETE FROM devices WHERE id = ?", [device_id])?;
        tx.commit()?;

        info!("Deleted device {} and its records", serial);
        Ok(())
    }

    /// Soft-delete a device by stamping `deleted_at`. History is retained.
    pub fn soft_delete_device(&self, serial: &str) -> Result<()> {
        let now = to_millis(OffsetDateTime::now_utc());
        let changed = self.conn.execute(
            "UPDATE devices SET deleted_at = ?2 WHERE serial_number = ?1",
            rusqlite::params![serial, now],
        )?;

        if changed == 0 {
            return Err(Error::DeviceNotFound(serial.to_string()));
        }
        Ok(())
    }

    /// Assign a device to a user and mark it owned.
    pub fn assign_user(&self, serial: &str, user_id: i64) -> Result<StoredDevice> {
        if self.get_user(user_id)?.is_none() {
            return Err(Error::UserNotFound(user_id));
        }

        let changed = self.conn.execute(
            "UPDATE devices SET user_id = ?2, status = ?3 WHERE serial_number = ?1",
            rusqlite::params![serial, user_id, DeviceStatus::Owner.as_str()],
        )?;

        if changed == 0 {
            return Err(Error::DeviceNotFound(serial.to_string()));
        }

        self.get_device_by_serial(serial)?
            .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))
    }

    /// Clear a device's user assignment and return it to the unassigned pool.
    pub fn unassign_user(&self, serial: &str) -> Result<StoredDevice> {
        let changed = self.conn.execute(
            "UPDATE devices SET user_id = NULL, status = ?2 WHERE serial_number = ?1",
            rusqlite::params![serial, DeviceStatus::New.as_str()],
        )?;

        if changed == 0 {
            return Err(Error::DeviceNotFound(serial.to_string()));
        }

        self.get_device_by_serial(serial)?
            .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))
    }

    /// List the devices assigned to a user.
    pub fn devices_for_user(&self, user_id: i64) -> Result<Vec<StoredDevice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices
             WHERE user_id = ? AND deleted_at IS NULL ORDER BY id DESC"
        ))?;

        let devices = stmt
            .query_map([user_id], device_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(devices)
    }
}

// === User operations ===
impl Store {
    /// Create a user. The email must be unique.
    pub fn create_user(&self, name: &str, email: &str) -> Result<StoredUser> {
        let now = to_millis(OffsetDateTime::now_utc());

        let result = self.conn.execute(
            "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, email, now],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::EmailTaken(email.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.ok_or(Error::UserNotFound(id))
    }

    /// Get a user by ID.
    pub fn get_user(&self, user_id: i64) -> Result<Option<StoredUser>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, email, created_at FROM users WHERE id = ?")?;

        let user = stmt
            .query_row([user_id], |row| {
                Ok(StoredUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    created_at: from_millis(row.get(3)?),
                })
            })
            .optional()?;

        Ok(user)
    }
}

// === Telemetry operations ===
impl Store {
    /// Durably record an accepted reading.
    ///
    /// Appends the history record and upserts the device's latest state in
    /// one transaction; both writes land or neither does. The caller (the
    /// ingestion engine) has already made the acceptance decision and
    /// resolved the session under the device's exclusion lock.
    pub fn ingest_accepted(
        &mut self,
        device_id: i64,
        reading: &ReadingSubmission,
        session_id: &str,
    ) -> Result<StoredRecord> {
        let recorded_at = to_millis(OffsetDateTime::now_utc());
        let timestamp = to_millis(reading.timestamp);

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO data_records
                (device_id, timestamp, value, unit, record_number, session_id, time_text, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                device_id,
                timestamp,
                reading.value,
                reading.unit,
                reading.record_number,
                session_id,
                reading.time_text,
                recorded_at
            ],
        )?;
        let record_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO latest_state (device_id, timestamp, record_number, session_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_id) DO UPDATE SET
                timestamp = ?2,
                record_number = ?3,
                session_id = ?4",
            rusqlite::params![device_id, timestamp, reading.record_number, session_id],
        )?;

        tx.commit()?;

        debug!(
            "Accepted record {} for device {} (session {})",
            record_id, device_id, session_id
        );

        let record = self
            .conn
            .query_row(
                "SELECT id, device_id, timestamp, value, unit, record_number,
                        session_id, time_text, recorded_at
                 FROM data_records WHERE id = ?",
                [record_id],
                record_from_row,
            )?;

        Ok(record)
    }

    /// List the `(record_number, timestamp)` pairs already stored for a
    /// device. The bulk ingest path uses this to drop resubmitted readings
    /// before inserting.
    pub fn record_keys(&self, device_id: i64) -> Result<Vec<(i64, OffsetDateTime)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record_number, timestamp FROM data_records WHERE device_id = ?")?;

        let keys = stmt
            .query_map([device_id], |row| {
                Ok((row.get(0)?, from_millis(row.get(1)?)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(keys)
    }

    /// Append a batch of backfilled readings in one transaction.
    ///
    /// Unlike [`Store::ingest_accepted`] this never touches the latest-state
    /// row: backfill restores gaps in history, it does not report the
    /// device's current reading.
    pub fn insert_backfill(
        &mut self,
        device_id: i64,
        readings: &[ReadingSubmission],
        session_id: &str,
    ) -> Result<usize> {
        let recorded_at = to_millis(OffsetDateTime::now_utc());

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO data_records
                    (device_id, timestamp, value, unit, record_number, session_id, time_text, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for reading in readings {
                stmt.execute(rusqlite::params![
                    device_id,
                    to_millis(reading.timestamp),
                    reading.value,
                    reading.unit,
                    reading.record_number,
                    session_id,
                    reading.time_text,
                    recorded_at
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Backfilled {} records for device {} (session {})",
            readings.len(),
            device_id,
            session_id
        );

        Ok(readings.len())
    }

    /// Get the latest state snapshot for a device.
    pub fn get_latest_state(&self, device_id: i64) -> Result<Option<LatestState>> {
        let mut stmt = self.conn.prepare(
            "SELECT device_id, timestamp, record_number, session_id
             FROM latest_state WHERE device_id = ?",
        )?;

        let state = stmt
            .query_row([device_id], |row| {
                Ok(LatestState {
                    device_id: row.get(0)?,
                    timestamp: from_millis(row.get(1)?),
                    record_number: row.get(2)?,
                    session_id: row.get(3)?,
                })
            })
            .optional()?;

        Ok(state)
    }

    /// Query telemetry records with filters.
    pub fn query_records(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_ref.as_slice(), record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get the full record behind the latest-state pointer.
    ///
    /// Exact-match lookup on the snapshot fields, so no ordering scan over
    /// history is needed.
    pub fn latest_record(&self, device_id: i64) -> Result<Option<StoredRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.device_id, r.timestamp, r.value, r.unit, r.record_number,
                    r.session_id, r.time_text, r.recorded_at
             FROM data_records r
             JOIN latest_state s ON s.device_id = r.device_id
                AND s.timestamp = r.timestamp
                AND s.record_number = r.record_number
                AND s.session_id = r.session_id
             WHERE r.device_id = ?
             ORDER BY r.id DESC LIMIT 1",
        )?;

        let record = stmt.query_row([device_id], record_from_row).optional()?;
        Ok(record)
    }

    /// Get all records of a device's most recent session, newest first.
    pub fn latest_session_records(&self, device_id: i64) -> Result<Vec<StoredRecord>> {
        let session_id: Option<String> = self
            .conn
            .query_row(
                "SELECT session_id FROM data_records
                 WHERE device_id = ? ORDER BY timestamp DESC LIMIT 1",
                [device_id],
                |row| row.get(0),
            )
            .optional()?;

        match session_id {
            Some(session_id) => {
                self.query_records(&RecordQuery::new().device(device_id).session(&session_id))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Count records, optionally for a single device.
    pub fn count_records(&self, device_id: Option<i64>) -> Result<u64> {
        let count: i64 = match device_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM data_records WHERE device_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM data_records", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn test_device(serial: &str) -> NewDevice {
        NewDevice {
            serial_number: serial.to_string(),
            device_id: Some("HW-01".to_string()),
            name: Some("Test Device".to_string()),
            model: Some("BT-900".to_string()),
        }
    }

    fn test_reading(ts: OffsetDateTime, value: f64, record_number: i64) -> ReadingSubmission {
        ReadingSubmission {
            serial_number: "SN1".to_string(),
            timestamp: ts,
            value,
            unit: "mg/L".to_string(),
            record_number,
            time_text: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        let page = store.query_devices(&DeviceQuery::new()).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_items, 0);
    }

    #[test]
    fn test_create_and_get_device() {
        let store = Store::open_in_memory().unwrap();

        let device = store.create_device(&test_device("SN1")).unwrap();
        assert_eq!(device.serial_number, "SN1");
        assert_eq!(device.status, DeviceStatus::New);
        assert!(device.user_id.is_none());
        assert!(device.deleted_at.is_none());

        let found = store.get_device_by_serial("SN1").unwrap().unwrap();
        assert_eq!(found.id, device.id);

        assert!(store.get_device_by_serial("missing").unwrap().is_none());
    }

    #[test]
    fn test_get_device_with_state() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        // No state until something is ingested
        let (_, state) = store.get_device_with_state("SN1").unwrap().unwrap();
        assert!(state.is_none());

        let reading = test_reading(OffsetDateTime::UNIX_EPOCH, 0.5, 1);
        store.ingest_accepted(device.id, &reading, "s1").unwrap();

        let (_, state) = store.get_device_with_state("SN1").unwrap().unwrap();
        let state = state.unwrap();
        assert_eq!(state.record_number, 1);
        assert_eq!(state.session_id, "s1");
        assert_eq!(state.timestamp, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_ingest_accepted_writes_both() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        let t0 = OffsetDateTime::UNIX_EPOCH;
        let record = store
            .ingest_accepted(device.id, &test_reading(t0, 0.5, 1), "s1")
            .unwrap();
        assert_eq!(record.value, 0.5);
        assert_eq!(record.session_id, "s1");

        assert_eq!(store.count_records(Some(device.id)).unwrap(), 1);
        let state = store.get_latest_state(device.id).unwrap().unwrap();
        assert_eq!(state.record_number, 1);

        // Second ingest replaces the state row, never duplicates it
        store
            .ingest_accepted(device.id, &test_reading(t0 + Duration::minutes(1), 0.6, 2), "s1")
            .unwrap();
        let state = store.get_latest_state(device.id).unwrap().unwrap();
        assert_eq!(state.record_number, 2);
        assert_eq!(store.count_records(Some(device.id)).unwrap(), 2);
    }

    #[test]
    fn test_latest_record_via_state_pointer() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        assert!(store.latest_record(device.id).unwrap().is_none());

        let t0 = OffsetDateTime::UNIX_EPOCH;
        store
            .ingest_accepted(device.id, &test_reading(t0, 0.5, 1), "s1")
            .unwrap();
        let newest = store
            .ingest_accepted(device.id, &test_reading(t0 + Duration::minutes(1), 0.7, 2), "s1")
            .unwrap();

        let latest = store.latest_record(device.id).unwrap().unwrap();
        assert_eq!(latest.id, newest.id);
        assert_eq!(latest.value, 0.7);
    }

    #[test]
    fn test_latest_session_records() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        let t0 = OffsetDateTime::UNIX_EPOCH;
        store
            .ingest_accepted(device.id, &test_reading(t0, 0.5, 1), "s1")
            .unwrap();
        store
            .ingest_accepted(device.id, &test_reading(t0 + Duration::minutes(1), 0.6, 2), "s1")
            .unwrap();
        // Counter rolled over: new session
        store
            .ingest_accepted(device.id, &test_reading(t0 + Duration::minutes(2), 0.4, 1), "s2")
            .unwrap();

        let records = store.latest_session_records(device.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, "s2");
    }

    #[test]
    fn test_insert_backfill_leaves_latest_state_alone() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        let t0 = OffsetDateTime::UNIX_EPOCH;
        store
            .ingest_accepted(device.id, &test_reading(t0 + Duration::hours(1), 0.5, 10), "s1")
            .unwrap();

        // Backfill two older readings in one batch
        let batch = vec![
            test_reading(t0, 0.2, 1),
            test_reading(t0 + Duration::minutes(1), 0.3, 2),
        ];
        let inserted = store.insert_backfill(device.id, &batch, "s0").unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count_records(Some(device.id)).unwrap(), 3);

        // The latest-state pointer still reflects the live reading
        let state = store.get_latest_state(device.id).unwrap().unwrap();
        assert_eq!(state.record_number, 10);
        assert_eq!(state.session_id, "s1");
    }

    #[test]
    fn test_record_keys() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        assert!(store.record_keys(device.id).unwrap().is_empty());

        let t0 = OffsetDateTime::UNIX_EPOCH;
        store
            .ingest_accepted(device.id, &test_reading(t0, 0.5, 1), "s1")
            .unwrap();
        store
            .ingest_accepted(device.id, &test_reading(t0 + Duration::minutes(1), 0.6, 2), "s1")
            .unwrap();

        let keys = store.record_keys(device.id).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&(1, t0)));
        assert!(keys.contains(&(2, t0 + Duration::minutes(1))));
    }

    #[test]
    fn test_query_devices_search_and_status() {
        let store = Store::open_in_memory().unwrap();
        store.create_device(&test_device("SN100")).unwrap();
        store.create_device(&test_device("SN200")).unwrap();
        store
            .create_device(&NewDevice {
                serial_number: "OTHER".to_string(),
                ..Default::default()
            })
            .unwrap();

        let page = store
            .query_devices(&DeviceQuery::new().search("sn"))
            .unwrap();
        assert_eq!(page.total_items, 2);

        store
            .update_device_status("SN100", DeviceStatus::Repair)
            .unwrap();
        let page = store
            .query_devices(&DeviceQuery::new().status(DeviceStatus::Repair))
            .unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].serial_number, "SN100");
    }

    #[test]
    fn test_query_devices_pagination() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..25 {
            store
                .create_device(&NewDevice {
                    serial_number: format!("SN{:03}", i),
                    ..Default::default()
                })
                .unwrap();
        }

        let page = store
            .query_devices(&DeviceQuery::new().page(2, 10))
            .unwrap();
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total_items, 25);
        assert_eq!(page.total_pages(), 3);
        // Newest registrations first
        assert_eq!(page.items[0].serial_number, "SN014");
    }

    #[test]
    fn test_soft_delete_hides_from_directory() {
        let store = Store::open_in_memory().unwrap();
        store.create_device(&test_device("SN1")).unwrap();

        store.soft_delete_device("SN1").unwrap();

        let page = store.query_devices(&DeviceQuery::new()).unwrap();
        assert!(page.items.is_empty());

        // Point lookup still resolves, with the tombstone set
        let device = store.get_device_by_serial("SN1").unwrap().unwrap();
        assert!(device.deleted_at.is_some());
    }

    #[test]
    fn test_hard_delete_removes_history() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();
        store
            .ingest_accepted(device.id, &test_reading(OffsetDateTime::UNIX_EPOCH, 0.5, 1), "s1")
            .unwrap();

        store.delete_device("SN1").unwrap();

        assert!(store.get_device_by_serial("SN1").unwrap().is_none());
        assert_eq!(store.count_records(None).unwrap(), 0);

        let err = store.delete_device("SN1").unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[test]
    fn test_users_and_assignment() {
        let store = Store::open_in_memory().unwrap();
        store.create_device(&test_device("SN1")).unwrap();

        let user = store.create_user("Alice", "alice@example.com").unwrap();
        assert_eq!(user.name, "Alice");

        // Duplicate email is rejected
        let err = store.create_user("Bob", "alice@example.com").unwrap_err();
        assert!(matches!(err, Error::EmailTaken(_)));

        // Assignment requires an existing user
        let err = store.assign_user("SN1", 999).unwrap_err();
        assert!(matches!(err, Error::UserNotFound(999)));

        let device = store.assign_user("SN1", user.id).unwrap();
        assert_eq!(device.user_id, Some(user.id));
        assert_eq!(device.status, DeviceStatus::Owner);

        let owned = store.devices_for_user(user.id).unwrap();
        assert_eq!(owned.len(), 1);

        let device = store.unassign_user("SN1").unwrap();
        assert!(device.user_id.is_none());
        assert_eq!(device.status, DeviceStatus::New);
    }

    #[test]
    fn test_update_device_partial() {
        let store = Store::open_in_memory().unwrap();
        store.create_device(&test_device("SN1")).unwrap();

        let device = store
            .update_device("SN1", Some("Renamed"), None, None, None)
            .unwrap();
        assert_eq!(device.name, Some("Renamed".to_string()));
        // Untouched fields survive
        assert_eq!(device.model, Some("BT-900".to_string()));

        let err = store
            .update_device("missing", Some("x"), None, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[test]
    fn test_record_query_filters() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        let t0 = OffsetDateTime::UNIX_EPOCH;
        for i in 0..5 {
            store
                .ingest_accepted(
                    device.id,
                    &test_reading(t0 + Duration::minutes(i), 0.1 * i as f64, i + 1),
                    "s1",
                )
                .unwrap();
        }

        let records = store
            .query_records(
                &RecordQuery::new()
                    .device(device.id)
                    .since(t0 + Duration::minutes(2)),
            )
            .unwrap();
        assert_eq!(records.len(), 3);
        // Newest first by default
        assert_eq!(records[0].record_number, 5);

        let records = store
            .query_records(&RecordQuery::new().device(device.id).oldest_first().limit(2))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_number, 1);
    }

    #[test]
    fn test_millisecond_timestamps_survive() {
        let mut store = Store::open_in_memory().unwrap();
        let device = store.create_device(&test_device("SN1")).unwrap();

        let ts = OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(1500);
        let record = store
            .ingest_accepted(device.id, &test_reading(ts, 0.5, 1), "s1")
            .unwrap();
        assert_eq!(record.timestamp, ts);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let store = Store::open(&path).unwrap();
        store.create_device(&test_device("SN1")).unwrap();
        drop(store);

        let store = Store::open(&path).unwrap();
        assert!(store.get_device_by_serial("SN1").unwrap().is_some());
    }
}
