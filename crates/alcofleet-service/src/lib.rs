//! HTTP REST backend for a fleet of breath-test devices.
//!
//! This crate provides a service that:
//! - Exposes a REST API for device registration and fleet management
//! - Ingests telemetry readings with per-device ordering guarantees
//! - Tracks reading sessions across device counter rollovers
//! - Assigns devices to user accounts
//! - Optional API key authentication and rate limiting
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check (no auth required)
//! - `POST /api/v1/device/register` - Register a device
//! - `GET /api/v1/device` - Paginated device directory
//! - `GET /api/v1/device/getByDeviceId/:serial` - Get one device
//! - `POST /api/v1/device/update/:serial` - Update device fields
//! - `POST /api/v1/device/updateStatus/:serial` - Update lifecycle status
//! - `DELETE /api/v1/device/:serial` - Hard delete
//! - `DELETE /api/v1/device/softDelete/:serial` - Soft delete
//! - `POST /api/v1/device/data` - Ingest a telemetry reading
//! - `POST /api/v1/device/data/bulk` - Backfill a batch of historical readings
//! - `GET /api/v1/device/:serial/lastedRecord` - Latest accepted record
//! - `GET /api/v1/device/:serial/records` - Records of the latest session
//! - `GET /api/v1/device/latestState/:serial` - Latest-state snapshot
//! - `POST /api/v1/user` / `GET /api/v1/user/:id` - User accounts
//! - `POST /api/v1/device-user/assign` - Assign device to user
//! - `POST /api/v1/device-user/unassign/:serial` - Clear assignment
//! - `GET /api/v1/device-user/user/:id` - Devices owned by a user
//! - `GET /api/v1/calculations/alcohol/:val` - Classify an alcohol value
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/alcofleet/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/alcofleet/data.db"
//! ```
//!
//! # Security
//!
//! Optional security features can be enabled:
//!
//! ```toml
//! [security]
//! # Require X-API-Key header for all requests (except /api/health)
//! api_key_enabled = true
//! api_key = "your-secure-random-key-at-least-16-chars"
//!
//! # Rate limit requests per IP address
//! rate_limit_enabled = true
//! rate_limit_requests = 100   # max requests per window
//! rate_limit_window_secs = 60 # window duration
//! ```

pub mod api;
pub mod config;
pub mod ingest;
pub mod middleware;
pub mod state;

pub use config::{Config, ConfigError, SecurityConfig, ServerConfig, StorageConfig};
pub use ingest::{BackfillOutcome, IngestEngine, IngestError, IngestOutcome, LockRegistry};
pub use state::AppState;
