//! Email (communication) rows - append-only once ingested

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::context::TenantContext;
use super::diesel_schema::emails;
use super::models::{current_timestamp, Email, EmailSummary, NewEmail};
use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailDirection {
    Inbound,
    Outbound,
}

impl EmailDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailDirection::Inbound => "inbound",
            EmailDirection::Outbound => "outbound",
        }
    }
}

/// Input for recording an email against a parent
#[derive(Debug, Clone, Deserialize)]
pub struct RecordEmailInput {
    pub direction: EmailDirection,
    pub from_address: String,
    #[serde(default)]
    pub to_address: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Provider message id, unique across the store when present
    #[serde(default)]
    pub email_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub sentiment_label: Option<String>,
    /// Defaults to `unread`
    #[serde(default)]
    pub status: Option<String>,
    /// Defaults to the time of ingest
    #[serde(default)]
    pub date_received: Option<DateTime<Utc>>,
}

impl RecordEmailInput {
    pub fn inbound(from_address: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            direction: EmailDirection::Inbound,
            from_address: from_address.into(),
            to_address: None,
            subject: Some(subject.into()),
            body: None,
            email_id: None,
            thread_id: None,
            sentiment_score: None,
            sentiment_label: None,
            status: None,
            date_received: None,
        }
    }
}

/// Record an email for an already-resolved parent row id
pub fn record_email(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    input: &RecordEmailInput,
) -> Result<Email, StorageError> {
    if input.from_address.trim().is_empty() {
        return Err(StorageError::InvalidInput("from_address is required".into()));
    }

    let now = current_timestamp();
    let date_received = input
        .date_received
        .map(|d| d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| now.clone());

    let new_email = NewEmail {
        customer_id: ctx.customer_id(),
        parent_id: parent_pk,
        email_id: input.email_id.as_deref(),
        thread_id: input.thread_id.as_deref(),
        direction: input.direction.as_str(),
        from_address: &input.from_address,
        to_address: input.to_address.as_deref(),
        subject: input.subject.as_deref(),
        body: input.body.as_deref(),
        sentiment_score: input.sentiment_score,
        sentiment_label: input.sentiment_label.as_deref(),
        status: input.status.as_deref().unwrap_or("unread"),
        date_received: &date_received,
        created_at: &now,
    };

    diesel::insert_into(emails::table)
        .values(&new_email)
        .execute(conn)
        .map_err(|e| StorageError::query("Email insert failed", e))?;

    emails::table
        .filter(emails::customer_id.eq(ctx.customer_id()))
        .filter(emails::parent_id.eq(parent_pk))
        .order(emails::id.desc())
        .select(Email::as_select())
        .first(conn)
        .map_err(|e| StorageError::query("Email fetch failed", e))
}

/// Most recently received emails first, regardless of ingest order
pub fn recent_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    limit: i64,
) -> Result<Vec<EmailSummary>, StorageError> {
    emails::table
        .filter(emails::customer_id.eq(ctx.customer_id()))
        .filter(emails::parent_id.eq(parent_pk))
        .order((emails::date_received.desc(), emails::id.desc()))
        .limit(limit)
        .select(EmailSummary::as_select())
        .load(conn)
        .map_err(|e| StorageError::query("Emails query failed", e))
}

pub fn count_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<i64, StorageError> {
    emails::table
        .filter(emails::customer_id.eq(ctx.customer_id()))
        .filter(emails::parent_id.eq(parent_pk))
        .count()
        .get_result(conn)
        .map_err(|e| StorageError::query("Email count failed", e))
}

pub fn delete_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<usize, StorageError> {
    diesel::delete(
        emails::table
            .filter(emails::customer_id.eq(ctx.customer_id()))
            .filter(emails::parent_id.eq(parent_pk)),
    )
    .execute(conn)
    .map_err(|e| StorageError::query("Emails delete failed", e))
}
