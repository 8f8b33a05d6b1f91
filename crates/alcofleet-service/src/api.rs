//! REST API endpoints for the alcofleet-service.
//!
//! This module provides HTTP endpoints for device management, telemetry
//! ingestion, user assignment, and stateless alcohol classification.
//!
//! # Response envelope
//!
//! Every `/api/v1` response body has the shape
//!
//! ```json
//! { "status": "success", "statusCode": 200, "message": "...", "data": ... }
//! ```
//!
//! `status` is `"success"` for 2xx and `"error"` for everything else, and
//! `statusCode` always matches the HTTP status line. `data` is `null` when
//! there is nothing to return (errors, skipped telemetry).
//!
//! # Concurrency and Lock Acquisition
//!
//! - **`state.store`** (Mutex): Acquired for database operations. Held
//!   briefly during queries; avoid long-running operations while holding it.
//! - **`state.config`** (RwLock): Read lock only; config is not mutated
//!   through the API.
//! - **Per-device ingestion locks** live inside [`crate::ingest::IngestEngine`]
//!   and are acquired before the store lock. The ingest path is the only
//!   place both are held, and it always takes the device lock first.
//!
//! # Error Handling
//!
//! All endpoints return the envelope via [`AppError`]. Store errors are
//! converted automatically: unknown devices and users map to 404, duplicate
//! emails to 409, everything else to 500.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use alcofleet_store::{DeviceQuery, NewDevice, StoredDevice, StoredRecord};
use alcofleet_types::{DeviceStatus, ReadingSubmission};

use crate::ingest::{IngestError, IngestOutcome};
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health
        .route("/api/health", get(health))
        // Device directory
        .route("/api/v1/device", get(list_devices))
        .route("/api/v1/device/register", post(register_device))
        .route("/api/v1/device/getByDeviceId/{serial}", get(get_device))
        .route("/api/v1/device/update/{serial}", post(update_device))
        .route("/api/v1/device/updateStatus/{serial}", post(update_status))
        .route("/api/v1/device/{serial}", delete(delete_device))
        .route("/api/v1/device/softDelete/{serial}", delete(soft_delete_device))
        // Telemetry
        .route("/api/v1/device/data", post(add_record))
        .route("/api/v1/device/data/bulk", post(add_records_bulk))
        .route("/api/v1/device/{serial}/lastedRecord", get(lasted_record))
        .route("/api/v1/device/{serial}/records", get(session_records))
        .route("/api/v1/device/latestState/{serial}", get(latest_state))
        // Users and assignment
        .route("/api/v1/user", post(create_user))
        .route("/api/v1/user/{id}", get(get_user))
        .route("/api/v1/device-user/assign", post(assign_device))
        .route("/api/v1/device-user/unassign/{serial}", post(unassign_device))
        .route("/api/v1/device-user/user/{user_id}", get(devices_by_user))
        // Classification
        .route("/api/v1/calculations/alcohol/{val}", get(alcohol_assessment))
}

/// Uniform JSON response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    fn reply(
        code: StatusCode,
        message: impl Into<String>,
        data: Option<T>,
    ) -> (StatusCode, Json<Self>) {
        let status = if code.is_success() { "success" } else { "error" };
        (
            code,
            Json(Self {
                status,
                status_code: code.as_u16(),
                message: message.into(),
                data,
            }),
        )
    }

    fn ok(message: impl Into<String>, data: T) -> (StatusCode, Json<Self>) {
        Self::reply(StatusCode::OK, message, Some(data))
    }

    fn created(message: impl Into<String>, data: T) -> (StatusCode, Json<Self>) {
        Self::reply(StatusCode::CREATED, message, Some(data))
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

// ==========================================================================
// Device directory
// ==========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDeviceRequest {
    serial_number: String,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Register a new device.
///
/// Re-registering a known serial number is reported without mutating the
/// existing device; field units in the field retry registration on every
/// boot.
async fn register_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredDevice>>), AppError> {
    if req.serial_number.trim().is_empty() {
        return Err(AppError::BadRequest(
            "serialNumber cannot be empty".to_string(),
        ));
    }

    let store = state.store.lock().await;

    if let Some(existing) = store.get_device_by_serial(&req.serial_number)? {
        return Ok(Envelope::ok("Device already registered", existing));
    }

    let device = store.create_device(&NewDevice {
        serial_number: req.serial_number,
        device_id: req.device_id,
        name: req.name,
        model: req.model,
    })?;

    Ok(Envelope::created("Device registered successfully", device))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DeviceListParams {
    page: Option<u32>,
    items_per_page: Option<u32>,
    search: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u32,
    items_per_page: u32,
    total_items: u64,
    total_pages: u64,
}

#[derive(Debug, Serialize)]
struct DeviceListData {
    devices: Vec<StoredDevice>,
    pagination: Pagination,
}

/// List devices with search, status filter, and pagination.
async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeviceListParams>,
) -> Result<(StatusCode, Json<Envelope<DeviceListData>>), AppError> {
    let mut query = DeviceQuery::new().page(
        params.page.unwrap_or(1),
        params.items_per_page.unwrap_or(10),
    );
    if let Some(search) = &params.search {
        query = query.search(search);
    }
    if let Some(status) = &params.status {
        let status: DeviceStatus = status
            .parse()
            .map_err(|e: alcofleet_types::ParseError| AppError::BadRequest(e.to_string()))?;
        query = query.status(status);
    }

    let page = {
        let store = state.store.lock().await;
        store.query_devices(&query)?
    };

    let pagination = Pagination {
        page: page.page,
        items_per_page: page.per_page,
        total_items: page.total_items,
        total_pages: page.total_pages(),
    };

    Ok(Envelope::ok(
        "Devices fetched successfully",
        DeviceListData {
            devices: page.items,
            pagination,
        },
    ))
}

/// Get a single device by serial number.
async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<StoredDevice>>), AppError> {
    let store = state.store.lock().await;
    let device = store
        .get_device_by_serial(&serial)?
        .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", serial)))?;

    Ok(Envelope::ok("Device fetched successfully", device))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct UpdateDeviceRequest {
    name: Option<String>,
    model: Option<String>,
    device_id: Option<String>,
    status: Option<String>,
}

/// Update a device's identity fields. Omitted fields are left unchanged.
async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredDevice>>), AppError> {
    let status = req
        .status
        .as_deref()
        .map(str::parse::<DeviceStatus>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let store = state.store.lock().await;
    let device = store.update_device(
        &serial,
        req.name.as_deref(),
        req.model.as_deref(),
        req.device_id.as_deref(),
        status,
    )?;

    Ok(Envelope::ok("Device updated successfully", device))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: String,
}

/// Update only the lifecycle status of a device.
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredDevice>>), AppError> {
    let status: DeviceStatus = req
        .status
        .parse()
        .map_err(|e: alcofleet_types::ParseError| AppError::BadRequest(e.to_string()))?;

    let store = state.store.lock().await;
    let device = store.update_device_status(&serial, status)?;

    Ok(Envelope::ok("Device status updated successfully", device))
}

/// Hard-delete a device and all its telemetry.
async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<()>>), AppError> {
    let mut store = state.store.lock().await;
    store.delete_device(&serial)?;

    Ok(Envelope::reply(
        StatusCode::OK,
        "Device deleted successfully",
        None,
    ))
}

/// Soft-delete a device. History is retained; the device disappears from
/// the directory listing.
async fn soft_delete_device(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<()>>), AppError> {
    let store = state.store.lock().await;
    store.soft_delete_device(&serial)?;

    Ok(Envelope::reply(
        StatusCode::OK,
        "Device soft-deleted successfully",
        None,
    ))
}

// ==========================================================================
// Telemetry
// ==========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataRecordRequest {
    serial_number: String,
    /// ISO-8601 timestamp text.
    timestamp: String,
    value: f64,
    unit: String,
    record_number: i64,
    /// Raw display time, if the device sends one.
    #[serde(default)]
    time: Option<String>,
}

impl DataRecordRequest {
    /// Validate the raw body and produce a well-typed submission.
    fn into_reading(self) -> Result<ReadingSubmission, AppError> {
        if self.serial_number.trim().is_empty() {
            return Err(AppError::BadRequest(
                "serialNumber cannot be empty".to_string(),
            ));
        }
        if self.unit.trim().is_empty() {
            return Err(AppError::BadRequest("unit cannot be empty".to_string()));
        }
        if self.record_number < 0 {
            return Err(AppError::BadRequest(format!(
                "recordNumber must be non-negative, got {}",
                self.record_number
            )));
        }
        if !self.value.is_finite() {
            return Err(AppError::BadRequest(
                "value must be a finite number".to_string(),
            ));
        }

        let timestamp = OffsetDateTime::parse(&self.timestamp, &Rfc3339).map_err(|e| {
            AppError::BadRequest(format!("invalid timestamp '{}': {}", self.timestamp, e))
        })?;

        let time_text = self.time.unwrap_or_else(|| self.timestamp.clone());

        Ok(ReadingSubmission {
            serial_number: self.serial_number,
            timestamp,
            value: self.value,
            unit: self.unit,
            record_number: self.record_number,
            time_text,
        })
    }
}

/// Ingest one telemetry reading.
///
/// Accepted readings return 200 with the stored record; skipped readings
/// also return 200, with `data: null` and a message saying why.
async fn add_record(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DataRecordRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredRecord>>), AppError> {
    let reading = req.into_reading()?;

    match state.engine.submit(&state.store, reading).await? {
        IngestOutcome::Accepted(record) => Ok(Envelope::ok("Record added successfully", record)),
        IngestOutcome::SkippedIdentical => Ok(Envelope::reply(
            StatusCode::OK,
            "Record skipped (identical)",
            None,
        )),
        IngestOutcome::SkippedStale => Ok(Envelope::reply(
            StatusCode::OK,
            "Record skipped (old or duplicate)",
            None,
        )),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkDataRequest {
    serial_number: String,
    /// Session to file the batch under; a fresh one is minted when absent.
    #[serde(default)]
    session_id: Option<String>,
    records: Vec<BulkRecordEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkRecordEntry {
    timestamp: String,
    value: f64,
    unit: String,
    record_number: i64,
    #[serde(default)]
    time: Option<String>,
}

/// Bulk-ingest historical readings for one device.
///
/// Used to backfill history after an outage. Readings already present
/// (matching record number or timestamp) are dropped; the rest are inserted
/// in one batch. Responds with the number of records actually added. The
/// latest-state pointer is left alone.
async fn add_records_bulk(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkDataRequest>,
) -> Result<(StatusCode, Json<Envelope<usize>>), AppError> {
    if req.serial_number.trim().is_empty() {
        return Err(AppError::BadRequest(
            "serialNumber cannot be empty".to_string(),
        ));
    }

    let serial = req.serial_number;
    let readings = req
        .records
        .into_iter()
        .map(|entry| {
            DataRecordRequest {
                serial_number: serial.clone(),
                timestamp: entry.timestamp,
                value: entry.value,
                unit: entry.unit,
                record_number: entry.record_number,
                time: entry.time,
            }
            .into_reading()
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    if readings.is_empty() {
        return Ok(Envelope::ok("No new records to add", 0));
    }

    let outcome = state
        .engine
        .backfill(&state.store, &serial, req.session_id, readings)
        .await?;

    if outcome.inserted == 0 {
        Ok(Envelope::ok("No new records to add", 0))
    } else {
        Ok(Envelope::ok("Records added successfully", outcome.inserted))
    }
}

/// Latest accepted record for a device, resolved through the latest-state
/// pointer.
async fn lasted_record(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<StoredRecord>>), AppError> {
    let store = state.store.lock().await;
    let device = store
        .get_device_by_serial(&serial)?
        .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", serial)))?;

    match store.latest_record(device.id)? {
        Some(record) => Ok(Envelope::ok("Record fetched successfully", record)),
        None => Ok(Envelope::reply(
            StatusCode::OK,
            "No records for device",
            None,
        )),
    }
}

/// All records of the device's most recent session, newest first.
async fn session_records(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<Vec<StoredRecord>>>), AppError> {
    let store = state.store.lock().await;
    let device = store
        .get_device_by_serial(&serial)?
        .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", serial)))?;

    let records = store.latest_session_records(device.id)?;
    Ok(Envelope::ok("Records fetched successfully", records))
}

/// Raw latest-state row for a device.
async fn latest_state(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<alcofleet_store::LatestState>>), AppError> {
    let store = state.store.lock().await;
    let device = store
        .get_device_by_serial(&serial)?
        .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", serial)))?;

    match store.get_latest_state(device.id)? {
        Some(latest) => Ok(Envelope::ok("Latest state fetched successfully", latest)),
        None => Ok(Envelope::reply(
            StatusCode::OK,
            "No latest state for device",
            None,
        )),
    }
}

// ==========================================================================
// Users and assignment
// ==========================================================================

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
}

/// Create a user account.
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Envelope<alcofleet_store::StoredUser>>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if req.email.trim().is_empty() {
        return Err(AppError::BadRequest("email cannot be empty".to_string()));
    }

    let store = state.store.lock().await;
    let user = store.create_user(&req.name, &req.email)?;

    Ok(Envelope::created("User created successfully", user))
}

/// Get a user by ID.
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Envelope<alcofleet_store::StoredUser>>), AppError> {
    let store = state.store.lock().await;
    let user = store
        .get_user(id)?
        .ok_or_else(|| AppError::NotFound(format!("User not found: {}", id)))?;

    Ok(Envelope::ok("User fetched successfully", user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignDeviceRequest {
    serial_number: String,
    user_id: i64,
}

/// Assign a device to a user. The device status becomes `owner`.
async fn assign_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AssignDeviceRequest>,
) -> Result<(StatusCode, Json<Envelope<StoredDevice>>), AppError> {
    let store = state.store.lock().await;
    let device = store.assign_user(&req.serial_number, req.user_id)?;

    Ok(Envelope::ok("Device assigned successfully", device))
}

/// Clear a device's user assignment.
async fn unassign_device(
    State(state): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<(StatusCode, Json<Envelope<StoredDevice>>), AppError> {
    let store = state.store.lock().await;
    let device = store.unassign_user(&serial)?;

    Ok(Envelope::ok("Device unassigned successfully", device))
}

/// List devices assigned to a user.
async fn devices_by_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<(StatusCode, Json<Envelope<Vec<StoredDevice>>>), AppError> {
    let store = state.store.lock().await;
    if store.get_user(user_id)?.is_none() {
        return Err(AppError::NotFound(format!("User not found: {}", user_id)));
    }

    let devices = store.devices_for_user(user_id)?;
    Ok(Envelope::ok("Devices fetched successfully", devices))
}

// ==========================================================================
// Classification
// ==========================================================================

/// Classify an alcohol value.
///
/// The path parameter is taken as text so a non-numeric value produces a
/// clean 400 instead of a router-level rejection.
async fn alcohol_assessment(
    Path(val): Path<String>,
) -> Result<(StatusCode, Json<Envelope<alcofleet_types::AlcoholAssessment>>), AppError> {
    let value: f64 = val
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid alcohol value '{}'", val)))?;
    if !value.is_finite() {
        return Err(AppError::BadRequest(
            "value must be a finite number".to_string(),
        ));
    }

    Ok(Envelope::ok(
        "Calculation successful",
        alcofleet_types::assess(value),
    ))
}

// ==========================================================================
// Errors
// ==========================================================================

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Store(alcofleet_store::Error),
    Internal(String),
}

impl From<alcofleet_store::Error> for AppError {
    fn from(e: alcofleet_store::Error) -> Self {
        match e {
            alcofleet_store::Error::DeviceNotFound(serial) => {
                AppError::NotFound(format!("Device not found: {}", serial))
            }
            alcofleet_store::Error::UserNotFound(id) => {
                AppError::NotFound(format!("User not found: {}", id))
            }
            alcofleet_store::Error::EmailTaken(email) => {
                AppError::Conflict(format!("Email already registered: {}", email))
            }
            other => AppError::Store(other),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::UnknownDevice(serial) => {
                AppError::NotFound(format!("Device not found: {}", serial))
            }
            IngestError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        Envelope::<()>::reply(status, message, None).into_response()
    }
}
