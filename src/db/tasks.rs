//! Follow-up tasks attached to a parent
//!
//! Task workflow lives elsewhere; this store only creates them (imports, AI
//! suggestions) and counts the ones still open for a parent's timeline.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::tasks;
use super::models::{current_timestamp, NewTask, Task};
use crate::error::StorageError;

/// Status a task reaches when it no longer counts as open
pub const COMPLETED_STATUS: &str = "completed";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(default)]
    pub ai_confidence: Option<f64>,
    #[serde(default)]
    pub ai_reasoning: Option<String>,
}

fn default_priority() -> String {
    "normal".to_string()
}

fn default_status() -> String {
    "pending".to_string()
}

impl CreateTaskInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            task_type: None,
            assigned_to: None,
            priority: default_priority(),
            status: default_status(),
            due_date: None,
            ai_generated: false,
            ai_confidence: None,
            ai_reasoning: None,
        }
    }
}

/// Create a task for an already-resolved parent row id
pub fn create_task(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    input: &CreateTaskInput,
) -> Result<Task, StorageError> {
    if input.title.trim().is_empty() {
        return Err(StorageError::InvalidInput("task title is required".into()));
    }

    let now = current_timestamp();
    let due_date = input.due_date.map(|d| d.format("%Y-%m-%d").to_string());
    let completed_at = (input.status == COMPLETED_STATUS).then(|| now.clone());

    let new_task = NewTask {
        customer_id: ctx.customer_id(),
        parent_id: parent_pk,
        assigned_to: input.assigned_to.as_deref(),
        title: &input.title,
        description: input.description.as_deref(),
        task_type: input.task_type.as_deref(),
        priority: &input.priority,
        status: &input.status,
        due_date: due_date.as_deref(),
        completed_at: completed_at.as_deref(),
        ai_generated: input.ai_generated,
        ai_confidence: input.ai_confidence,
        ai_reasoning: input.ai_reasoning.as_deref(),
        created_at: &now,
        updated_at: &now,
    };

    diesel::insert_into(tasks::table)
        .values(&new_task)
        .execute(conn)
        .map_err(|e| StorageError::query("Task insert failed", e))?;

    tasks::table
        .filter(tasks::customer_id.eq(ctx.customer_id()))
        .filter(tasks::parent_id.eq(parent_pk))
        .order(tasks::id.desc())
        .select(Task::as_select())
        .first(conn)
        .map_err(|e| StorageError::query("Task fetch failed", e))
}

/// Tasks for a parent whose status is anything but completed
pub fn open_count_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<i64, StorageError> {
    tasks::table
        .filter(tasks::customer_id.eq(ctx.customer_id()))
        .filter(tasks::parent_id.eq(parent_pk))
        .filter(tasks::status.ne(COMPLETED_STATUS))
        .count()
        .get_result(conn)
        .map_err(|e| StorageError::query("Task count failed", e))
}

pub fn delete_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<usize, StorageError> {
    diesel::delete(
        tasks::table
            .filter(tasks::customer_id.eq(ctx.customer_id()))
            .filter(tasks::parent_id.eq(parent_pk)),
    )
    .execute(conn)
    .map_err(|e| StorageError::query("Tasks delete failed", e))
}
