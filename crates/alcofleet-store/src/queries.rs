//! Query builders for telemetry records and the device directory.
//!
//! Both builders follow the fluent pattern: all filters are optional and
//! can be chained in any order.
//!
//! # Example
//!
//! ```
//! use alcofleet_store::{Store, RecordQuery, DeviceQuery};
//!
//! let store = Store::open_in_memory()?;
//!
//! // Recent records for one device, paginated
//! let query = RecordQuery::new().device(1).limit(50).offset(0);
//! let records = store.query_records(&query)?;
//!
//! // Device directory search
//! let page = store.query_devices(&DeviceQuery::new().search("SN0").page(1, 10))?;
//! # Ok::<(), alcofleet_store::Error>(())
//! ```

use alcofleet_types::DeviceStatus;
use time::OffsetDateTime;

use crate::models::StoredDevice;

/// Fluent query builder for telemetry records.
///
/// By default results are ordered by `timestamp` descending (newest first).
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    /// Filter by internal device ID.
    pub device_id: Option<i64>,
    /// Filter by session identifier.
    pub session_id: Option<String>,
    /// Filter records at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter records at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl RecordQuery {
    /// Create a new query: no filters, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by internal device ID.
    pub fn device(mut self, device_id: i64) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Filter by session identifier.
    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    /// Filter to records at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to records at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results. Use with `limit()` for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results oldest first (chronological).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id));
        }

        if let Some(ref session_id) = self.session_id {
            conditions.push("session_id = ?");
            params.push(Box::new(session_id.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new((since.unix_timestamp_nanos() / 1_000_000) as i64));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new((until.unix_timestamp_nanos() / 1_000_000) as i64));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL statement.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_id, timestamp, value, unit, record_number,
             session_id, time_text, recorded_at
             FROM data_records {} ORDER BY timestamp {}",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}

/// Fluent query builder for the device directory.
///
/// Soft-deleted devices are always excluded. The free-text `search` filter
/// matches name, serial number, model, and hardware device ID
/// (case-insensitive substring).
#[derive(Debug, Clone)]
pub struct DeviceQuery {
    /// Free-text search across identifying fields.
    pub search: Option<String>,
    /// Filter by lifecycle status.
    pub status: Option<DeviceStatus>,
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

impl Default for DeviceQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            page: 1,
            per_page: 10,
        }
    }
}

impl DeviceQuery {
    /// Create a new query with default pagination (page 1, 10 per page).
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-text search across name, serial, model, and device ID.
    pub fn search(mut self, search: &str) -> Self {
        self.search = Some(search.to_string());
        self
    }

    /// Filter by lifecycle status.
    pub fn status(mut self, status: DeviceStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set pagination. `page` is 1-based; zero is clamped to 1.
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.max(1);
        self
    }

    /// Row offset implied by the pagination settings.
    pub(crate) fn sql_offset(&self) -> u32 {
        (self.page - 1) * self.per_page
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref search) = self.search {
            let pattern = format!("%{}%", search.to_lowercase());
            conditions.push(
                "(LOWER(IFNULL(name, '')) LIKE ?1
                  OR LOWER(serial_number) LIKE ?1
                  OR LOWER(IFNULL(model, '')) LIKE ?1
                  OR LOWER(IFNULL(device_id, '')) LIKE ?1)"
                    .to_string(),
            );
            params.push(Box::new(pattern));
        }

        if let Some(status) = self.status {
            conditions.push(format!("status = ?{}", params.len() + 1));
            params.push(Box::new(status.as_str()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }
}

/// One page of the device directory.
#[derive(Debug, Clone)]
pub struct DevicePage {
    /// Devices on this page.
    pub items: Vec<StoredDevice>,
    /// Total devices matching the filters (all pages).
    pub total_items: u64,
    /// 1-based page number that was requested.
    pub page: u32,
    /// Items per page that was requested.
    pub per_page: u32,
}

impl DevicePage {
    /// Total number of pages.
    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(self.per_page as u64)
    }
}
