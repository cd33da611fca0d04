//! Parent (lead) CRUD and search using Diesel with tenant scoping
//!
//! All operations require a TenantContext. Lookups by external id that miss
//! within the tenant return `None`; callers decide whether that is NotFound.

use std::collections::HashMap;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use super::children::{self, CreateChildInput};
use super::context::TenantContext;
use super::diesel_schema::{parent_tags, parents};
use super::filter::{self, ParentFilter, SortOrder};
use super::journey_events::{self, RecordJourneyEventInput};
use super::lifecycle::{self, ParentStage, ParentStatus};
use super::models::{
    current_date, current_timestamp, generate_parent_id, JsonMap, NewParent, NewParentTag,
    Parent, ParentChangeset, ParentRecord, ParentWithChildren,
};
use super::{emails, notes, tasks};
use crate::error::StorageError;

/// Largest page a search may request
pub const MAX_PER_PAGE: i64 = 100;

// ============================================================================
// Query Types
// ============================================================================

/// Input for creating a parent together with its children
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateParentInput {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub secondary_email: Option<String>,
    #[serde(default)]
    pub secondary_phone: Option<String>,
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub address: Option<JsonMap>,
    #[serde(default)]
    pub status: ParentStatus,
    #[serde(default)]
    pub stage: ParentStage,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_detail: Option<String>,
    #[serde(default)]
    pub lead_score: i32,
    #[serde(default)]
    pub engagement_score: i32,
    #[serde(default)]
    pub risk_score: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub preferred_contact_method: Option<String>,
    #[serde(default)]
    pub preferred_contact_time: Option<String>,
    /// Defaults to `en`
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub custom_fields: JsonMap,
    #[serde(default)]
    pub children: Vec<CreateChildInput>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateParentInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub secondary_email: Option<String>,
    #[serde(default)]
    pub secondary_phone: Option<String>,
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub address: Option<JsonMap>,
    #[serde(default)]
    pub status: Option<ParentStatus>,
    #[serde(default)]
    pub stage: Option<ParentStage>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_detail: Option<String>,
    #[serde(default)]
    pub lead_score: Option<i32>,
    #[serde(default)]
    pub engagement_score: Option<i32>,
    #[serde(default)]
    pub risk_score: Option<i32>,
    /// Replaces the whole tag list when present
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub preferred_contact_method: Option<String>,
    #[serde(default)]
    pub preferred_contact_time: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub custom_fields: Option<JsonMap>,
}

/// Filter, ordering and page window for a search
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub filter: ParentFilter,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub page: i64,
    pub per_page: i64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            filter: ParentFilter::default(),
            sort_by: None,
            sort_order: SortOrder::Desc,
            page: 1,
            per_page: 20,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.page < 1 {
            return Err(StorageError::InvalidInput("page must be >= 1".into()));
        }
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(StorageError::InvalidInput(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(())
    }
}

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ParentListResponse {
    pub parents: Vec<ParentWithChildren>,
    #[ts(type = "number")]
    pub total: i64,
    #[ts(type = "number")]
    pub page: i64,
    #[ts(type = "number")]
    pub per_page: i64,
    #[ts(type = "number")]
    pub pages: i64,
}

/// Page count for `total` rows; zero rows means zero pages
pub fn page_count(total: i64, per_page: i64) -> i64 {
    if per_page <= 0 {
        return 0;
    }
    (total + per_page - 1) / per_page
}

// ============================================================================
// Read Operations
// ============================================================================

/// Find a parent row by external id - scoped by tenant
pub fn find_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_id: &str,
) -> Result<Option<Parent>, StorageError> {
    parents::table
        .filter(parents::customer_id.eq(ctx.customer_id()))
        .filter(parents::parent_id.eq(parent_id))
        .select(Parent::as_select())
        .first(conn)
        .optional()
        .map_err(|e| StorageError::query("Parent lookup failed", e))
}

/// Tags of one parent in insertion order
pub fn get_tags(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<Vec<String>, StorageError> {
    parent_tags::table
        .filter(parent_tags::customer_id.eq(ctx.customer_id()))
        .filter(parent_tags::parent_id.eq(parent_pk))
        .order(parent_tags::position.asc())
        .select(parent_tags::tag)
        .load(conn)
        .map_err(|e| StorageError::query("Tags query failed", e))
}

fn load_tags_for(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pks: &[i32],
) -> Result<HashMap<i32, Vec<String>>, StorageError> {
    if parent_pks.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i32, String)> = parent_tags::table
        .filter(parent_tags::customer_id.eq(ctx.customer_id()))
        .filter(parent_tags::parent_id.eq_any(parent_pks))
        .order((parent_tags::parent_id.asc(), parent_tags::position.asc()))
        .select((parent_tags::parent_id, parent_tags::tag))
        .load(conn)
        .map_err(|e| StorageError::query("Tags query failed", e))?;

    let mut grouped: HashMap<i32, Vec<String>> = HashMap::new();
    for (pk, tag) in rows {
        grouped.entry(pk).or_default().push(tag);
    }
    Ok(grouped)
}

/// Parent view (with tags) by external id
pub fn get_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_id: &str,
) -> Result<Option<ParentRecord>, StorageError> {
    match find_parent(conn, ctx, parent_id)? {
        Some(row) => {
            let tags = get_tags(conn, ctx, row.id)?;
            Ok(Some(ParentRecord::from_row(row, tags)?))
        }
        None => Ok(None),
    }
}

fn with_children(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: Parent,
) -> Result<ParentWithChildren, StorageError> {
    let tags = get_tags(conn, ctx, row.id)?;
    let kids = children::list_for_parent(conn, ctx, row.id)?;
    Ok(ParentWithChildren {
        parent: ParentRecord::from_row(row, tags)?,
        children: kids,
    })
}

/// Filtered, sorted, paged search - scoped by tenant
pub fn search_parents(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    params: &SearchParams,
) -> Result<ParentListResponse, StorageError> {
    params.validate()?;

    let total: i64 = filter::compile(ctx, &params.filter)
        .count()
        .get_result(conn)
        .map_err(|e| StorageError::query("Parent count failed", e))?;

    let (sort_field, sort_order) = filter::resolve_sort(params.sort_by.as_deref(), params.sort_order);
    let offset = (params.page - 1).saturating_mul(params.per_page);

    let rows: Vec<Parent> = filter::apply_sort(filter::compile(ctx, &params.filter), sort_field, sort_order)
        .limit(params.per_page)
        .offset(offset)
        .load(conn)
        .map_err(|e| StorageError::query("Parent search failed", e))?;

    let pks: Vec<i32> = rows.iter().map(|p| p.id).collect();
    let mut tags = load_tags_for(conn, ctx, &pks)?;
    let mut kids = children::load_for_parents(conn, ctx, &pks)?;

    let parents = rows
        .into_iter()
        .map(|row| {
            let pk = row.id;
            Ok(ParentWithChildren {
                parent: ParentRecord::from_row(row, tags.remove(&pk).unwrap_or_default())?,
                children: kids.remove(&pk).unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, StorageError>>()?;

    debug!(
        customer_id = ctx.customer_id(),
        total,
        returned = parents.len(),
        "Parent search"
    );

    Ok(ParentListResponse {
        parents,
        total,
        page: params.page,
        per_page: params.per_page,
        pages: page_count(total, params.per_page),
    })
}

// ============================================================================
// Write Operations
// ============================================================================

/// Trimmed, de-duplicated tags in first-seen order
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t: &String| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

fn insert_tags(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    tags: &[String],
) -> Result<(), StorageError> {
    for (position, tag) in normalize_tags(tags).iter().enumerate() {
        let new_tag = NewParentTag {
            customer_id: ctx.customer_id(),
            parent_id: parent_pk,
            tag,
            position: position as i32,
        };
        diesel::insert_into(parent_tags::table)
            .values(&new_tag)
            .execute(conn)
            .map_err(|e| StorageError::query("Tag insert failed", e))?;
    }
    Ok(())
}

fn delete_tags(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<usize, StorageError> {
    diesel::delete(
        parent_tags::table
            .filter(parent_tags::customer_id.eq(ctx.customer_id()))
            .filter(parent_tags::parent_id.eq(parent_pk)),
    )
    .execute(conn)
    .map_err(|e| StorageError::query("Tag delete failed", e))
}

fn to_json(map: &JsonMap) -> Result<String, StorageError> {
    Ok(serde_json::to_string(map)?)
}

/// Create a parent, its tags, its children and the intake journey event
///
/// Runs in one transaction: either all of it is written or none of it.
pub fn create_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    input: CreateParentInput,
) -> Result<ParentWithChildren, StorageError> {
    conn.transaction(|conn| {
        let now = current_timestamp();
        let today = current_date();
        let external_id = generate_parent_id();
        let address_json = input.address.as_ref().map(to_json).transpose()?;
        let custom_fields_json = to_json(&input.custom_fields)?;

        let new_parent = NewParent {
            customer_id: ctx.customer_id(),
            parent_id: &external_id,
            name: input.name.trim(),
            email: input.email.as_deref(),
            phone: input.phone.as_deref(),
            secondary_email: input.secondary_email.as_deref(),
            secondary_phone: input.secondary_phone.as_deref(),
            partner_name: input.partner_name.as_deref(),
            address_json: address_json.as_deref(),
            status: input.status.as_str(),
            stage: input.stage.as_str(),
            source: input.source.as_deref(),
            source_detail: input.source_detail.as_deref(),
            lead_score: input.lead_score,
            engagement_score: input.engagement_score,
            risk_score: input.risk_score,
            preferred_contact_method: input.preferred_contact_method.as_deref(),
            preferred_contact_time: input.preferred_contact_time.as_deref(),
            language: input.language.as_deref().unwrap_or("en"),
            custom_fields_json: &custom_fields_json,
            created_at: &now,
            updated_at: &now,
            first_contact_date: Some(&today),
            last_contact_date: Some(&today),
        };

        diesel::insert_into(parents::table)
            .values(&new_parent)
            .execute(conn)
            .map_err(|e| StorageError::query("Parent insert failed", e))?;

        let row = find_parent(conn, ctx, &external_id)?
            .ok_or_else(|| StorageError::Internal("Inserted parent not readable".into()))?;

        insert_tags(conn, ctx, row.id, &input.tags)?;
        for child in &input.children {
            children::insert_child(conn, ctx, row.id, child)?;
        }
        journey_events::record_event(conn, ctx, row.id, &RecordJourneyEventInput::intake())?;

        debug!(
            customer_id = ctx.customer_id(),
            parent_id = %external_id,
            children = input.children.len(),
            "Parent created"
        );

        with_children(conn, ctx, row)
    })
}

/// Apply a partial update; returns `None` when the parent is not in the tenant
///
/// Always refreshes `updated_at` and `last_contact_date`. A status or stage
/// change appends a journey event and nudges `engagement_score` by the
/// transition impact, unless the update sets `engagement_score` itself.
pub fn update_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_id: &str,
    input: UpdateParentInput,
) -> Result<Option<ParentRecord>, StorageError> {
    conn.transaction(|conn| {
        let current = match find_parent(conn, ctx, parent_id)? {
            Some(row) => row,
            None => return Ok(None),
        };

        let transitions = lifecycle::detect_transitions(
            current.status()?,
            current.stage()?,
            input.status,
            input.stage,
        );
        let engagement_score = match input.engagement_score {
            Some(explicit) => Some(explicit),
            None if !transitions.is_empty() => {
                let delta: i32 = transitions.iter().map(|t| t.impact_score).sum();
                Some(lifecycle::adjust_score(current.engagement_score, delta))
            }
            None => None,
        };

        let changeset = ParentChangeset {
            name: input.name.as_deref().map(str::trim).map(str::to_string),
            email: input.email,
            phone: input.phone,
            secondary_email: input.secondary_email,
            secondary_phone: input.secondary_phone,
            partner_name: input.partner_name,
            address_json: input.address.as_ref().map(to_json).transpose()?,
            status: input.status.map(|s| s.as_str().to_string()),
            stage: input.stage.map(|s| s.as_str().to_string()),
            source: input.source,
            source_detail: input.source_detail,
            lead_score: input.lead_score,
            engagement_score,
            risk_score: input.risk_score,
            preferred_contact_method: input.preferred_contact_method,
            preferred_contact_time: input.preferred_contact_time,
            language: input.language,
            custom_fields_json: input.custom_fields.as_ref().map(to_json).transpose()?,
            updated_at: Some(current_timestamp()),
            last_contact_date: Some(current_date()),
        };

        diesel::update(
            parents::table
                .filter(parents::customer_id.eq(ctx.customer_id()))
                .filter(parents::id.eq(current.id)),
        )
        .set(&changeset)
        .execute(conn)
        .map_err(|e| StorageError::query("Parent update failed", e))?;

        if let Some(ref tags) = input.tags {
            delete_tags(conn, ctx, current.id)?;
            insert_tags(conn, ctx, current.id, tags)?;
        }

        for transition in &transitions {
            journey_events::record_event(
                conn,
                ctx,
                current.id,
                &RecordJourneyEventInput::transition(transition),
            )?;
        }

        get_parent(conn, ctx, parent_id)
    })
}

/// Delete a parent and everything it owns; `false` when not in the tenant
pub fn delete_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_id: &str,
) -> Result<bool, StorageError> {
    conn.transaction(|conn| {
        let row = match find_parent(conn, ctx, parent_id)? {
            Some(row) => row,
            None => return Ok(false),
        };

        let removed_children = children::delete_for_parent(conn, ctx, row.id)?;
        let removed_emails = emails::delete_for_parent(conn, ctx, row.id)?;
        let removed_notes = notes::delete_for_parent(conn, ctx, row.id)?;
        let removed_events = journey_events::delete_for_parent(conn, ctx, row.id)?;
        let removed_tasks = tasks::delete_for_parent(conn, ctx, row.id)?;
        delete_tags(conn, ctx, row.id)?;

        diesel::delete(
            parents::table
                .filter(parents::customer_id.eq(ctx.customer_id()))
                .filter(parents::id.eq(row.id)),
        )
        .execute(conn)
        .map_err(|e| StorageError::query("Parent delete failed", e))?;

        debug!(
            customer_id = ctx.customer_id(),
            parent_id,
            removed_children,
            removed_emails,
            removed_notes,
            removed_events,
            removed_tasks,
            "Parent deleted"
        );
        Ok(true)
    })
}

/// Number of parents in the tenant
pub fn parent_count(conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<i64, StorageError> {
    parents::table
        .filter(parents::customer_id.eq(ctx.customer_id()))
        .count()
        .get_result(conn)
        .map_err(|e| StorageError::query("Parent count failed", e))
}
