//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::StorageError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, StorageError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| StorageError::query("Failed to create schema_version table", e))?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()
        .map_err(|e| StorageError::query("Failed to read schema_version", e))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), StorageError> {
    conn.batch_execute("DELETE FROM schema_version")
        .map_err(|e| StorageError::query("Failed to clear schema_version", e))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)
        .map_err(|e| StorageError::query("Failed to set schema_version", e))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &mut SqliteConnection) -> Result<(), StorageError> {
    conn.batch_execute(PARENTS_SCHEMA)
        .map_err(|e| StorageError::query("Failed to create parent tables", e))?;

    conn.batch_execute(ACTIVITY_SCHEMA)
        .map_err(|e| StorageError::query("Failed to create activity tables", e))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| StorageError::query("Failed to create indexes", e))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, _from_version: i32) -> Result<(), StorageError> {
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Parent (lead) records and the rows they own directly
const PARENTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT NOT NULL,
    parent_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,

    -- Contact
    email TEXT,
    phone TEXT,
    secondary_email TEXT,
    secondary_phone TEXT,
    partner_name TEXT,
    address_json TEXT,

    -- Funnel position
    status TEXT NOT NULL DEFAULT 'lead',
    stage TEXT NOT NULL DEFAULT 'awareness',
    source TEXT,
    source_detail TEXT,

    -- Derived scores (advisory)
    lead_score INTEGER NOT NULL DEFAULT 0,
    engagement_score INTEGER NOT NULL DEFAULT 0,
    risk_score INTEGER NOT NULL DEFAULT 0,

    preferred_contact_method TEXT,
    preferred_contact_time TEXT,
    language TEXT NOT NULL DEFAULT 'en',
    custom_fields_json TEXT NOT NULL DEFAULT '{}',

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    first_contact_date TEXT,
    last_contact_date TEXT
);

-- Tags stored separately; position keeps insertion order for display
CREATE TABLE IF NOT EXISTS parent_tags (
    customer_id TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (customer_id, parent_id, tag),
    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS children (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    dob TEXT,
    current_year_group TEXT,
    target_year_group TEXT,
    current_school TEXT,
    interests TEXT,
    special_requirements TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE
);
"#;

/// Append-only activity attached to a parent
const ACTIVITY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS emails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    email_id TEXT UNIQUE,
    thread_id TEXT,
    direction TEXT NOT NULL,
    from_address TEXT NOT NULL,
    to_address TEXT,
    subject TEXT,
    body TEXT,
    sentiment_score REAL,
    sentiment_label TEXT,
    status TEXT NOT NULL DEFAULT 'unread',
    date_received TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    note_type TEXT NOT NULL DEFAULT 'general',
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS journey_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    event_subtype TEXT,
    title TEXT NOT NULL,
    description TEXT,
    metadata_json TEXT,
    sentiment_before REAL,
    sentiment_after REAL,
    impact_score INTEGER,
    created_by TEXT NOT NULL,
    event_date TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT NOT NULL,
    parent_id INTEGER NOT NULL,
    assigned_to TEXT,
    title TEXT NOT NULL,
    description TEXT,
    task_type TEXT,
    priority TEXT NOT NULL DEFAULT 'normal',
    status TEXT NOT NULL DEFAULT 'pending',
    due_date TEXT,
    completed_at TEXT,
    ai_generated INTEGER NOT NULL DEFAULT 0,
    ai_confidence REAL,
    ai_reasoning TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES parents(id) ON DELETE CASCADE
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Parent indexes (every query is tenant-scoped first)
CREATE INDEX IF NOT EXISTS idx_parents_customer ON parents(customer_id);
CREATE INDEX IF NOT EXISTS idx_parents_customer_status ON parents(customer_id, status);
CREATE INDEX IF NOT EXISTS idx_parents_customer_stage ON parents(customer_id, stage);
CREATE INDEX IF NOT EXISTS idx_parents_customer_created ON parents(customer_id, created_at);

-- Tag index
CREATE INDEX IF NOT EXISTS idx_parent_tags_tag ON parent_tags(customer_id, tag);

-- Child-of-parent indexes
CREATE INDEX IF NOT EXISTS idx_children_parent ON children(customer_id, parent_id);
CREATE INDEX IF NOT EXISTS idx_emails_parent ON emails(customer_id, parent_id, date_received);
CREATE INDEX IF NOT EXISTS idx_notes_parent ON notes(customer_id, parent_id, created_at);
CREATE INDEX IF NOT EXISTS idx_journey_events_parent ON journey_events(customer_id, parent_id, event_date);
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(customer_id, parent_id, status);
"#;
