//! Child (dependent) rows - scoped by tenant and owned by one parent

use std::collections::HashMap;

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::children;
use super::models::{current_timestamp, Child, NewChild};
use crate::error::StorageError;

/// Input for adding a child to a parent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateChildInput {
    pub name: String,
    #[serde(default)]
    pub dob: Option<NaiveDate>,
    #[serde(default)]
    pub current_year_group: Option<String>,
    #[serde(default)]
    pub target_year_group: Option<String>,
    #[serde(default)]
    pub current_school: Option<String>,
    #[serde(default)]
    pub interests: Option<String>,
    #[serde(default)]
    pub special_requirements: Option<String>,
}

impl CreateChildInput {
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidInput("child name is required".into()));
        }
        Ok(())
    }
}

/// Insert a child for an already-resolved parent row id
pub fn insert_child(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    input: &CreateChildInput,
) -> Result<Child, StorageError> {
    let now = current_timestamp();
    let dob = input.dob.map(|d| d.format("%Y-%m-%d").to_string());

    let new_child = NewChild {
        customer_id: ctx.customer_id(),
        parent_id: parent_pk,
        name: input.name.trim(),
        dob: dob.as_deref(),
        current_year_group: input.current_year_group.as_deref(),
        target_year_group: input.target_year_group.as_deref(),
        current_school: input.current_school.as_deref(),
        interests: input.interests.as_deref(),
        special_requirements: input.special_requirements.as_deref(),
        created_at: &now,
        updated_at: &now,
    };

    diesel::insert_into(children::table)
        .values(&new_child)
        .execute(conn)
        .map_err(|e| StorageError::query("Child insert failed", e))?;

    children::table
        .filter(children::customer_id.eq(ctx.customer_id()))
        .filter(children::parent_id.eq(parent_pk))
        .order(children::id.desc())
        .select(Child::as_select())
        .first(conn)
        .map_err(|e| StorageError::query("Child fetch failed", e))
}

/// Children of one parent in insertion order
pub fn list_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<Vec<Child>, StorageError> {
    children::table
        .filter(children::customer_id.eq(ctx.customer_id()))
        .filter(children::parent_id.eq(parent_pk))
        .order(children::id.asc())
        .select(Child::as_select())
        .load(conn)
        .map_err(|e| StorageError::query("Children query failed", e))
}

/// Children of many parents in one query, grouped by parent row id
pub fn load_for_parents(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pks: &[i32],
) -> Result<HashMap<i32, Vec<Child>>, StorageError> {
    if parent_pks.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Child> = children::table
        .filter(children::customer_id.eq(ctx.customer_id()))
        .filter(children::parent_id.eq_any(parent_pks))
        .order(children::id.asc())
        .select(Child::as_select())
        .load(conn)
        .map_err(|e| StorageError::query("Children query failed", e))?;

    let mut grouped: HashMap<i32, Vec<Child>> = HashMap::new();
    for child in rows {
        grouped.entry(child.parent_id).or_default().push(child);
    }
    Ok(grouped)
}

/// Remove every child of a parent; returns rows deleted
pub fn delete_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<usize, StorageError> {
    diesel::delete(
        children::table
            .filter(children::customer_id.eq(ctx.customer_id()))
            .filter(children::parent_id.eq(parent_pk)),
    )
    .execute(conn)
    .map_err(|e| StorageError::query("Children delete failed", e))
}
