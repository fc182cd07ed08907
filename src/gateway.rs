//! Remote data gateway: typed CRUD plus change-fed snapshots per table.
//!
//! The hosted backend is treated as an opaque remote store. Every contract
//! table has the same generic shape — `(id, data, created_at, updated_at)`
//! with the entity record serialized into `data` — and the gateway maintains
//! one in-memory snapshot per table with observable semantics: the latest
//! value is always available synchronously, and new values are pushed to
//! subscribers.
//!
//! Replication is last-known-full-state: after any write the gateway reloads
//! the table's full snapshot and republishes it. A periodic refresh task
//! stands in for the backend's change feed to pick up writes from other
//! processes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Row as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[cfg(feature = "sqlite")]
use sqlx::SqlitePool;

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::errors::{SyncError, SyncResult};
use crate::models::License;

/// The contract tables. Names are the wire contract with the backend and the
/// one place where bit-exact compatibility matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Applications,
    Licenses,
    PaymentAddresses,
    Settings,
    Contacts,
    Content,
    LicenseCategories,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Applications,
        Table::Licenses,
        Table::PaymentAddresses,
        Table::Settings,
        Table::Contacts,
        Table::Content,
        Table::LicenseCategories,
    ];

    fn index(&self) -> usize {
        match self {
            Table::Applications => 0,
            Table::Licenses => 1,
            Table::PaymentAddresses => 2,
            Table::Settings => 3,
            Table::Contacts => 4,
            Table::Content => 5,
            Table::LicenseCategories => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Applications => "applications",
            Table::Licenses => "licenses",
            Table::PaymentAddresses => "payment_addresses",
            Table::Settings => "settings",
            Table::Contacts => "contacts",
            Table::Content => "content",
            Table::LicenseCategories => "license_categories",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One stored row: entity record plus gateway-maintained timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Connect based on configuration.
    pub async fn connect(config: &DatabaseConfig) -> SyncResult<Self> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePool::connect(&config.sqlite_url).await.map_err(|e| {
                    error!("Failed to connect to SQLite: {e}");
                    SyncError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                })?;
                Ok(Database::SQLite(pool))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(SyncError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&config.postgres_url).await.map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {e}");
                    SyncError::DatabaseError(format!("failed to connect to PostgreSQL: {e}"))
                })?;
                Ok(Database::Postgres(pool))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(SyncError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(SyncError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// In-memory SQLite pool, pinned to one connection so every query sees
    /// the same database. Intended for tests and local development.
    #[cfg(feature = "sqlite")]
    pub async fn connect_sqlite_memory() -> SyncResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| SyncError::DatabaseError(format!("failed to open sqlite memory: {e}")))?;
        Ok(Database::SQLite(pool))
    }

    /// Create all contract tables if missing.
    pub async fn init_schema(&self) -> SyncResult<()> {
        for table in Table::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id         TEXT PRIMARY KEY,
                    data       TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#
            );

            match self {
                #[cfg(feature = "sqlite")]
                Database::SQLite(pool) => {
                    sqlx::query(&ddl).execute(pool).await.map_err(|e| {
                        error!("SQLite schema init failed for {table}: {e}");
                        SyncError::DatabaseError(format!("schema init failed: {e}"))
                    })?;
                }
                #[cfg(feature = "postgres")]
                Database::Postgres(pool) => {
                    sqlx::query(&ddl).execute(pool).await.map_err(|e| {
                        error!("Postgres schema init failed for {table}: {e}");
                        SyncError::DatabaseError(format!("schema init failed: {e}"))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Insert or update a row, keyed on `id`.
    ///
    /// `created_at` is set on first insert and preserved on update;
    /// `updated_at` is always refreshed.
    pub async fn upsert_row(&self, table: Table, id: &str, data: &Value) -> SyncResult<()> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(data)?;

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let sql = format!(
                    r#"
                    INSERT INTO {table} (id, data, created_at, updated_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        data       = excluded.data,
                        updated_at = excluded.updated_at
                    "#
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(&payload)
                    .bind(&now)
                    .bind(&now)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite upsert into {table} failed: {e}");
                        SyncError::DatabaseError(format!("database error: {e}"))
                    })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let sql = format!(
                    r#"
                    INSERT INTO {table} (id, data, created_at, updated_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (id) DO UPDATE SET
                        data       = EXCLUDED.data,
                        updated_at = EXCLUDED.updated_at
                    "#
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(&payload)
                    .bind(&now)
                    .bind(&now)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres upsert into {table} failed: {e}");
                        SyncError::DatabaseError(format!("database error: {e}"))
                    })?;
            }
        }

        Ok(())
    }

    /// Load the full contents of a table, oldest rows first.
    pub async fn load_all(&self, table: Table) -> SyncResult<Vec<StoredRow>> {
        let sql =
            format!("SELECT id, data, created_at, updated_at FROM {table} ORDER BY created_at, id");

        let raw: Vec<(String, String, String, String)> = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("SQLite load_all from {table} failed: {e}");
                    SyncError::DatabaseError(format!("database error: {e}"))
                })?
                .into_iter()
                .map(|row| (row.get(0), row.get(1), row.get(2), row.get(3)))
                .collect(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Postgres load_all from {table} failed: {e}");
                    SyncError::DatabaseError(format!("database error: {e}"))
                })?
                .into_iter()
                .map(|row| (row.get(0), row.get(1), row.get(2), row.get(3)))
                .collect(),
        };

        let mut rows = Vec::with_capacity(raw.len());
        for (id, data, created_at, updated_at) in raw {
            let data = serde_json::from_str(&data).unwrap_or(Value::Null);
            rows.push(StoredRow {
                id,
                data,
                created_at: parse_timestamp(&created_at),
                updated_at: parse_timestamp(&updated_at),
            });
        }
        Ok(rows)
    }

    /// Delete a row by id.
    ///
    /// Returns `Ok(true)` if a row was removed, `Ok(false)` if none matched.
    pub async fn delete_row(&self, table: Table, id: &str) -> SyncResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let sql = format!("DELETE FROM {table} WHERE id = ?");
                sqlx::query(&sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite delete from {table} failed: {e}");
                        SyncError::DatabaseError(format!("database error: {e}"))
                    })?
                    .rows_affected()
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let sql = format!("DELETE FROM {table} WHERE id = $1");
                sqlx::query(&sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres delete from {table} failed: {e}");
                        SyncError::DatabaseError(format!("database error: {e}"))
                    })?
                    .rows_affected()
            }
        };

        Ok(rows_affected > 0)
    }

    /// Point lookup for an active license by its human-facing code.
    ///
    /// Returns:
    /// - `Ok(Some(row))` if an active license matches
    /// - `Ok(None)` if not found or not active
    /// - `Err(SyncError::DatabaseError)` on query failure
    pub async fn find_active_license(&self, license_code: &str) -> SyncResult<Option<StoredRow>> {
        let raw: Option<(String, String, String, String)> = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let sql = "SELECT id, data, created_at, updated_at FROM licenses \
                           WHERE json_extract(data, '$.license_id') = ? \
                             AND json_extract(data, '$.status') = 'active'";
                sqlx::query(sql)
                    .bind(license_code)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("SQLite license lookup failed: {e}");
                        SyncError::DatabaseError(format!("database error: {e}"))
                    })?
                    .map(|row| (row.get(0), row.get(1), row.get(2), row.get(3)))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let sql = "SELECT id, data, created_at, updated_at FROM licenses \
                           WHERE data::jsonb ->> 'license_id' = $1 \
                             AND data::jsonb ->> 'status' = 'active'";
                sqlx::query(sql)
                    .bind(license_code)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        error!("Postgres license lookup failed: {e}");
                        SyncError::DatabaseError(format!("database error: {e}"))
                    })?
                    .map(|row| (row.get(0), row.get(1), row.get(2), row.get(3)))
            }
        };

        Ok(raw.map(|(id, data, created_at, updated_at)| StoredRow {
            id,
            data: serde_json::from_str(&data).unwrap_or(Value::Null),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        }))
    }
}

/// The gateway proper: database plus observable per-table snapshots.
pub struct RemoteGateway {
    db: Database,
    snapshots: [watch::Sender<Vec<StoredRow>>; Table::ALL.len()],
}

impl RemoteGateway {
    /// Wrap a connected database: initialize the schema and load the initial
    /// snapshot of every table.
    pub async fn new(db: Database) -> SyncResult<Self> {
        db.init_schema().await?;

        let snapshots = std::array::from_fn(|_| watch::channel(Vec::new()).0);
        let gateway = Self { db, snapshots };
        gateway.refresh_all().await;
        Ok(gateway)
    }

    /// Connect from configuration.
    pub async fn connect(config: &DatabaseConfig) -> SyncResult<Self> {
        let db = Database::connect(config).await?;
        Self::new(db).await
    }

    fn sender(&self, table: Table) -> &watch::Sender<Vec<StoredRow>> {
        &self.snapshots[table.index()]
    }

    /// Latest known full state of a table, available without awaiting.
    pub fn snapshot(&self, table: Table) -> Vec<StoredRow> {
        self.sender(table).borrow().clone()
    }

    /// Latest known state deserialized into entity records. Rows that no
    /// longer parse are dropped with a warning rather than failing the read.
    pub fn typed_snapshot<T: DeserializeOwned>(&self, table: Table) -> Vec<T> {
        self.sender(table)
            .borrow()
            .iter()
            .filter_map(|row| match serde_json::from_value(row.data.clone()) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(table = %table, id = %row.id, error = %e, "Dropping unparseable row");
                    None
                }
            })
            .collect()
    }

    /// Subscribe to snapshot updates for a table.
    pub fn watch(&self, table: Table) -> watch::Receiver<Vec<StoredRow>> {
        self.sender(table).subscribe()
    }

    /// Reload a table's full state from the backend and republish it.
    pub async fn refresh(&self, table: Table) -> SyncResult<Vec<StoredRow>> {
        let rows = self.db.load_all(table).await?;
        self.sender(table).send_replace(rows.clone());
        Ok(rows)
    }

    /// Refresh every table; per-table failures are logged and skipped.
    pub async fn refresh_all(&self) {
        for table in Table::ALL {
            if let Err(e) = self.refresh(table).await {
                warn!(table = %table, error = %e, "Snapshot refresh failed");
            }
        }
    }

    /// Write an entity record and republish the table snapshot, so the
    /// writer's own subsequent read observes the write.
    pub async fn upsert<T: Serialize>(&self, table: Table, id: &str, entity: &T) -> SyncResult<()> {
        let data = serde_json::to_value(entity)?;
        self.db.upsert_row(table, id, &data).await?;
        self.refresh(table).await?;
        Ok(())
    }

    /// Delete a row and republish the table snapshot.
    pub async fn delete(&self, table: Table, id: &str) -> SyncResult<bool> {
        let removed = self.db.delete_row(table, id).await?;
        if removed {
            self.refresh(table).await?;
        }
        Ok(removed)
    }

    /// Public license verification: point lookup filtered to active status.
    ///
    /// Returns `None` on not-found *and* on any query error — callers cannot
    /// distinguish the two, which is accepted for this low-stakes public
    /// lookup.
    pub async fn verify_license(&self, license_code: &str) -> Option<License> {
        match self.db.find_active_license(license_code).await {
            Ok(Some(row)) => match serde_json::from_value(row.data) {
                Ok(license) => Some(license),
                Err(e) => {
                    warn!(code = %license_code, error = %e, "Stored license failed to parse");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(code = %license_code, error = %e, "Verification lookup failed");
                None
            }
        }
    }

    /// Periodic snapshot refresh, standing in for the backend change feed.
    /// The caller owns the handle and aborts it on shutdown.
    pub fn spawn_refresh_task(gateway: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                gateway.refresh_all().await;
            }
        })
    }
}
