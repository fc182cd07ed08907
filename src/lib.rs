//! Certsync - synchronization and encrypted-persistence core for a license
//! certificate storefront.
//!
//! # Features
//!
//! Certsync uses feature flags to allow you to include only what you need:
//!
//! - `server` - HTTP surface (health, public verification, submissions).
//!   Enabled by default.
//! - `sqlite` - SQLite backend for the remote gateway. Enabled by default.
//! - `postgres` - PostgreSQL backend for the remote gateway.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (server + sqlite)
//! certsync = "0.3"
//!
//! # Embedded core only (no HTTP surface)
//! certsync = { version = "0.3", default-features = false, features = ["sqlite"] }
//!
//! # Server with PostgreSQL
//! certsync = { version = "0.3", features = ["server", "postgres"] }
//! ```

// Core modules (always available)
pub mod audit;
pub mod broadcast;
pub mod config;
pub mod encryption;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod manager;
pub mod migration;
pub mod models;
pub mod poller;
pub mod session;
pub mod store;
pub mod validation;

// HTTP surface (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use errors::{SyncError, SyncResult};
pub use events::{Envelope, EventKind};
pub use manager::DataManager;
