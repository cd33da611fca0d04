//! Diesel model definitions for database tables
//!
//! All rows carry `customer_id` for tenant scoping.
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//! - API views: rows reshaped for callers (parsed JSON bags, enums, tags)
//!
//! TypeScript types are generated via ts-rs. Run:
//!   cargo test export_bindings
//! Generated files go to: bindings/

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;
use super::lifecycle::{self, ParentStage, ParentStatus};
use crate::error::StorageError;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Current UTC timestamp as ISO 8601 with millisecond precision
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Current UTC calendar date (`YYYY-MM-DD`)
pub fn current_date() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// New external parent id: `PARENT-` followed by 8 upper-case hex chars
pub fn generate_parent_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("PARENT-{}", hex[..8].to_uppercase())
}

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

fn parse_json_map(raw: &str, column: &str) -> Result<JsonMap, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Internal(format!("Corrupt {} column: {}", column, e)))
}

// ============================================================================
// Parent Models
// ============================================================================

/// Parent row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = parents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Parent {
    pub id: i32,
    pub customer_id: String,
    pub parent_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub secondary_email: Option<String>,
    pub secondary_phone: Option<String>,
    pub partner_name: Option<String>,
    pub address_json: Option<String>,
    pub status: String,
    pub stage: String,
    pub source: Option<String>,
    pub source_detail: Option<String>,
    pub lead_score: i32,
    pub engagement_score: i32,
    pub risk_score: i32,
    pub preferred_contact_method: Option<String>,
    pub preferred_contact_time: Option<String>,
    pub language: String,
    pub custom_fields_json: String,
    pub created_at: String,
    pub updated_at: String,
    pub first_contact_date: Option<String>,
    pub last_contact_date: Option<String>,
}

impl Parent {
    pub fn status(&self) -> Result<ParentStatus, StorageError> {
        self.status
            .parse()
            .map_err(|_| StorageError::Internal(format!("Corrupt status '{}'", self.status)))
    }

    pub fn stage(&self) -> Result<ParentStage, StorageError> {
        self.stage
            .parse()
            .map_err(|_| StorageError::Internal(format!("Corrupt stage '{}'", self.stage)))
    }
}

/// Parent as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ParentRecord {
    pub id: i32,
    pub parent_id: String,
    pub customer_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub secondary_email: Option<String>,
    pub secondary_phone: Option<String>,
    pub partner_name: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    pub address: Option<JsonMap>,
    pub status: ParentStatus,
    pub stage: ParentStage,
    pub source: Option<String>,
    pub source_detail: Option<String>,
    pub lead_score: i32,
    pub engagement_score: i32,
    pub risk_score: i32,
    pub is_high_risk: bool,
    pub tags: Vec<String>,
    pub preferred_contact_method: Option<String>,
    pub preferred_contact_time: Option<String>,
    pub language: String,
    #[ts(type = "Record<string, unknown>")]
    pub custom_fields: JsonMap,
    pub created_at: String,
    pub updated_at: String,
    pub first_contact_date: Option<String>,
    pub last_contact_date: Option<String>,
}

impl ParentRecord {
    /// Reshape a stored row, attaching its tags in insertion order
    pub fn from_row(row: Parent, tags: Vec<String>) -> Result<Self, StorageError> {
        let status = row.status()?;
        let stage = row.stage()?;
        let address = row
            .address_json
            .as_deref()
            .map(|raw| parse_json_map(raw, "address_json"))
            .transpose()?;
        let custom_fields = parse_json_map(&row.custom_fields_json, "custom_fields_json")?;

        Ok(Self {
            id: row.id,
            parent_id: row.parent_id,
            customer_id: row.customer_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            secondary_email: row.secondary_email,
            secondary_phone: row.secondary_phone,
            partner_name: row.partner_name,
            address,
            status,
            stage,
            source: row.source,
            source_detail: row.source_detail,
            lead_score: row.lead_score,
            engagement_score: row.engagement_score,
            risk_score: row.risk_score,
            is_high_risk: lifecycle::is_high_risk(row.risk_score),
            tags,
            preferred_contact_method: row.preferred_contact_method,
            preferred_contact_time: row.preferred_contact_time,
            language: row.language,
            custom_fields,
            created_at: row.created_at,
            updated_at: row.updated_at,
            first_contact_date: row.first_contact_date,
            last_contact_date: row.last_contact_date,
        })
    }
}

/// Parent with its children attached (search results)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ParentWithChildren {
    #[serde(flatten)]
    pub parent: ParentRecord,
    pub children: Vec<Child>,
}

/// Parent with its activity timeline (detail view)
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ParentWithDetails {
    #[serde(flatten)]
    pub parent: ParentRecord,
    pub children: Vec<Child>,
    pub recent_emails: Vec<EmailSummary>,
    pub recent_notes: Vec<Note>,
    pub journey_events: Vec<JourneyEventSummary>,
    #[ts(type = "number")]
    pub email_count: i64,
    #[ts(type = "number")]
    pub task_count: i64,
}

/// New parent for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = parents)]
pub struct NewParent<'a> {
    pub customer_id: &'a str,
    pub parent_id: &'a str,
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub secondary_email: Option<&'a str>,
    pub secondary_phone: Option<&'a str>,
    pub partner_name: Option<&'a str>,
    pub address_json: Option<&'a str>,
    pub status: &'a str,
    pub stage: &'a str,
    pub source: Option<&'a str>,
    pub source_detail: Option<&'a str>,
    pub lead_score: i32,
    pub engagement_score: i32,
    pub risk_score: i32,
    pub preferred_contact_method: Option<&'a str>,
    pub preferred_contact_time: Option<&'a str>,
    pub language: &'a str,
    pub custom_fields_json: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
    pub first_contact_date: Option<&'a str>,
    pub last_contact_date: Option<&'a str>,
}

/// Partial parent update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = parents)]
pub struct ParentChangeset {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub secondary_email: Option<String>,
    pub secondary_phone: Option<String>,
    pub partner_name: Option<String>,
    pub address_json: Option<String>,
    pub status: Option<String>,
    pub stage: Option<String>,
    pub source: Option<String>,
    pub source_detail: Option<String>,
    pub lead_score: Option<i32>,
    pub engagement_score: Option<i32>,
    pub risk_score: Option<i32>,
    pub preferred_contact_method: Option<String>,
    pub preferred_contact_time: Option<String>,
    pub language: Option<String>,
    pub custom_fields_json: Option<String>,
    pub updated_at: Option<String>,
    pub last_contact_date: Option<String>,
}

/// New parent tag for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = parent_tags)]
pub struct NewParentTag<'a> {
    pub customer_id: &'a str,
    pub parent_id: i32,
    pub tag: &'a str,
    pub position: i32,
}

/// Columns the stats aggregator needs from each parent
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = parents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ParentStatsRow {
    pub status: String,
    pub stage: String,
    pub source: Option<String>,
    pub lead_score: i32,
    pub risk_score: i32,
    pub created_at: String,
}

// ============================================================================
// Child Models
// ============================================================================

/// Child row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = children)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct Child {
    pub id: i32,
    pub customer_id: String,
    pub parent_id: i32,
    pub name: String,
    pub dob: Option<String>,
    pub current_year_group: Option<String>,
    pub target_year_group: Option<String>,
    pub current_school: Option<String>,
    pub interests: Option<String>,
    pub special_requirements: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New child for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = children)]
pub struct NewChild<'a> {
    pub customer_id: &'a str,
    pub parent_id: i32,
    pub name: &'a str,
    pub dob: Option<&'a str>,
    pub current_year_group: Option<&'a str>,
    pub target_year_group: Option<&'a str>,
    pub current_school: Option<&'a str>,
    pub interests: Option<&'a str>,
    pub special_requirements: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Email Models
// ============================================================================

/// Email row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = emails)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct Email {
    pub id: i32,
    pub customer_id: String,
    pub parent_id: i32,
    pub email_id: Option<String>,
    pub thread_id: Option<String>,
    pub direction: String,
    pub from_address: String,
    pub to_address: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<String>,
    pub status: String,
    pub date_received: String,
    pub created_at: String,
}

/// Email as it appears on a parent's timeline
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = emails)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct EmailSummary {
    pub id: i32,
    pub direction: String,
    pub from_address: String,
    pub subject: Option<String>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<String>,
    pub status: String,
    pub date_received: String,
}

/// New email for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = emails)]
pub struct NewEmail<'a> {
    pub customer_id: &'a str,
    pub parent_id: i32,
    pub email_id: Option<&'a str>,
    pub thread_id: Option<&'a str>,
    pub direction: &'a str,
    pub from_address: &'a str,
    pub to_address: Option<&'a str>,
    pub subject: Option<&'a str>,
    pub body: Option<&'a str>,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: Option<&'a str>,
    pub status: &'a str,
    pub date_received: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Note Models
// ============================================================================

/// Note row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = notes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct Note {
    pub id: i32,
    pub customer_id: String,
    pub parent_id: i32,
    pub content: String,
    pub note_type: String,
    pub created_by: String,
    pub created_at: String,
}

/// New note for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNote<'a> {
    pub customer_id: &'a str,
    pub parent_id: i32,
    pub content: &'a str,
    pub note_type: &'a str,
    pub created_by: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Journey Event Models
// ============================================================================

/// Journey event row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = journey_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct JourneyEvent {
    pub id: i32,
    pub customer_id: String,
    pub parent_id: i32,
    pub event_type: String,
    pub event_subtype: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub metadata_json: Option<String>,
    pub sentiment_before: Option<f64>,
    pub sentiment_after: Option<f64>,
    pub impact_score: Option<i32>,
    pub created_by: String,
    pub event_date: String,
    pub created_at: String,
}

/// Journey event as it appears on a parent's timeline
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = journey_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct JourneyEventSummary {
    pub id: i32,
    pub event_type: String,
    pub event_subtype: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub sentiment_before: Option<f64>,
    pub sentiment_after: Option<f64>,
    pub impact_score: Option<i32>,
    pub created_by: String,
    pub event_date: String,
}

/// New journey event for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = journey_events)]
pub struct NewJourneyEvent<'a> {
    pub customer_id: &'a str,
    pub parent_id: i32,
    pub event_type: &'a str,
    pub event_subtype: Option<&'a str>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub metadata_json: Option<&'a str>,
    pub sentiment_before: Option<f64>,
    pub sentiment_after: Option<f64>,
    pub impact_score: Option<i32>,
    pub created_by: &'a str,
    pub event_date: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Task Models
// ============================================================================

/// Task row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct Task {
    pub id: i32,
    pub customer_id: String,
    pub parent_id: i32,
    pub assigned_to: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub task_type: Option<String>,
    pub priority: String,
    pub status: String,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub ai_generated: bool,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New task for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub customer_id: &'a str,
    pub parent_id: i32,
    pub assigned_to: Option<&'a str>,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub task_type: Option<&'a str>,
    pub priority: &'a str,
    pub status: &'a str,
    pub due_date: Option<&'a str>,
    pub completed_at: Option<&'a str>,
    pub ai_generated: bool,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}
