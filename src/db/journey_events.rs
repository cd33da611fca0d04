//! Journey events - the append-only audit trail of a parent's funnel history

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::journey_events;
use super::lifecycle::{self, LifecycleTransition};
use super::models::{current_timestamp, JourneyEvent, JourneyEventSummary, NewJourneyEvent};
use crate::error::StorageError;

/// Input for recording a journey event
#[derive(Debug, Clone, Deserialize)]
pub struct RecordJourneyEventInput {
    pub event_type: String,
    #[serde(default)]
    pub event_subtype: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub sentiment_before: Option<f64>,
    #[serde(default)]
    pub sentiment_after: Option<f64>,
    #[serde(default)]
    pub impact_score: Option<i32>,
    pub created_by: String,
    /// Defaults to the time of recording
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
}

impl RecordJourneyEventInput {
    /// The single event written when a parent is created
    pub fn intake() -> Self {
        Self {
            event_type: lifecycle::intake::EVENT_TYPE.to_string(),
            event_subtype: Some(lifecycle::intake::EVENT_SUBTYPE.to_string()),
            title: lifecycle::intake::TITLE.to_string(),
            description: Some(lifecycle::intake::DESCRIPTION.to_string()),
            metadata: None,
            sentiment_before: None,
            sentiment_after: None,
            impact_score: Some(lifecycle::intake::IMPACT_SCORE),
            created_by: lifecycle::SYSTEM_ACTOR.to_string(),
            event_date: None,
        }
    }

    /// Audit entry for a status or stage move
    pub fn transition(transition: &LifecycleTransition) -> Self {
        Self {
            event_type: transition.event_type.to_string(),
            event_subtype: Some(transition.to.to_string()),
            title: transition.title(),
            description: None,
            metadata: Some(transition.metadata()),
            sentiment_before: None,
            sentiment_after: None,
            impact_score: Some(transition.impact_score),
            created_by: lifecycle::SYSTEM_ACTOR.to_string(),
            event_date: None,
        }
    }
}

/// Record an event for an already-resolved parent row id
pub fn record_event(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    input: &RecordJourneyEventInput,
) -> Result<JourneyEvent, StorageError> {
    if input.event_type.trim().is_empty() || input.title.trim().is_empty() {
        return Err(StorageError::InvalidInput(
            "journey events need an event_type and a title".into(),
        ));
    }

    let now = current_timestamp();
    let event_date = input
        .event_date
        .map(|d| d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| now.clone());
    let metadata_json = input
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let new_event = NewJourneyEvent {
        customer_id: ctx.customer_id(),
        parent_id: parent_pk,
        event_type: &input.event_type,
        event_subtype: input.event_subtype.as_deref(),
        title: &input.title,
        description: input.description.as_deref(),
        metadata_json: metadata_json.as_deref(),
        sentiment_before: input.sentiment_before,
        sentiment_after: input.sentiment_after,
        impact_score: input.impact_score,
        created_by: &input.created_by,
        event_date: &event_date,
        created_at: &now,
    };

    diesel::insert_into(journey_events::table)
        .values(&new_event)
        .execute(conn)
        .map_err(|e| StorageError::query("Journey event insert failed", e))?;

    journey_events::table
        .filter(journey_events::customer_id.eq(ctx.customer_id()))
        .filter(journey_events::parent_id.eq(parent_pk))
        .order(journey_events::id.desc())
        .select(JourneyEvent::as_select())
        .first(conn)
        .map_err(|e| StorageError::query("Journey event fetch failed", e))
}

/// Most recent events first by event time
pub fn recent_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    limit: i64,
) -> Result<Vec<JourneyEventSummary>, StorageError> {
    journey_events::table
        .filter(journey_events::customer_id.eq(ctx.customer_id()))
        .filter(journey_events::parent_id.eq(parent_pk))
        .order((journey_events::event_date.desc(), journey_events::id.desc()))
        .limit(limit)
        .select(JourneyEventSummary::as_select())
        .load(conn)
        .map_err(|e| StorageError::query("Journey events query failed", e))
}

/// Every event of a given type, oldest first
pub fn list_by_type(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    event_type: &str,
) -> Result<Vec<JourneyEvent>, StorageError> {
    journey_events::table
        .filter(journey_events::customer_id.eq(ctx.customer_id()))
        .filter(journey_events::parent_id.eq(parent_pk))
        .filter(journey_events::event_type.eq(event_type))
        .order(journey_events::id.asc())
        .select(JourneyEvent::as_select())
        .load(conn)
        .map_err(|e| StorageError::query("Journey events query failed", e))
}

pub fn delete_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<usize, StorageError> {
    diesel::delete(
        journey_events::table
            .filter(journey_events::customer_id.eq(ctx.customer_id()))
            .filter(journey_events::parent_id.eq(parent_pk)),
    )
    .execute(conn)
    .map_err(|e| StorageError::query("Journey events delete failed", e))
}
