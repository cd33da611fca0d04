//! SQLite tenant store for the admissions CRM
//!
//! Every repository function takes a `&mut SqliteConnection` and a
//! [`TenantContext`]; the context's customer id is applied to every query so
//! rows never cross tenants. [`ParentDb`] owns the connection pool and hands
//! connections to those functions.
//!
//! ## Tables
//!
//! - `parents` - Leads (contact details, status/stage, scores, JSON bags)
//! - `parent_tags` - Tag index with insertion position
//! - `children` - Dependents owned by a parent
//! - `emails` / `notes` / `journey_events` - Append-only activity
//! - `tasks` - Follow-ups, read for open-task counts

pub mod children;
pub mod context;
pub mod diesel_schema;
pub mod emails;
pub mod filter;
pub mod journey_events;
pub mod lifecycle;
pub mod models;
pub mod notes;
pub mod parents;
pub mod schema;
pub mod stats;
pub mod tasks;
pub mod timeline;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::StorageError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas and SQL functions applied when the pool opens a connection
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout={}; PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)?;

        filter::register_text_functions(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite handle passed explicitly into every service
pub struct ParentDb {
    pool: DbPool,
}

impl ParentDb {
    /// Open or create the CRM database at `path`
    pub fn open(path: &Path, pool_size: u32, timeout: Duration) -> Result<Self, StorageError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        info!(path = ?path, pool_size, "Opening SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(timeout)
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: 5000,
            }))
            .build(manager)
            .map_err(|e| StorageError::Connection(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Each in-memory connection is its own database, so the pool holds
    /// exactly one connection and never recycles it.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: 5000,
            }))
            .build(manager)
            .map_err(|e| StorageError::Connection(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    fn get(&self) -> Result<DbConn, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Unavailable(format!("No database connection: {}", e)))
    }

    /// Run `f` with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut conn = self.get()?;
        f(&mut *conn)
    }

    /// Run `f` inside one all-or-nothing transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError>,
    {
        let mut pooled = self.get()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.transaction(f)
    }

    /// Cheap liveness probe for health checks
    pub fn ping(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.batch_execute("SELECT 1")
                .map_err(|e| StorageError::query("Ping failed", e))
        })
    }

    /// Pool state for diagnostics
    pub fn pool_state(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

// Re-exports
pub use context::TenantContext;
pub use filter::{ParentFilter, SortField, SortOrder};
pub use lifecycle::{ParentStage, ParentStatus};
pub use models::{
    Child, EmailSummary, JourneyEventSummary, Note, ParentRecord, ParentWithChildren,
    ParentWithDetails,
};
pub use parents::{CreateParentInput, ParentListResponse, SearchParams, UpdateParentInput};
pub use stats::ParentStats;
