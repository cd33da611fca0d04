//! Parent service - business logic for the admissions funnel
//!
//! Wraps the parent repositories with validation, NotFound mapping and event
//! emission. Every method takes the caller's TenantContext explicitly.

use std::sync::Arc;

use chrono::Utc;

use crate::db::children::{self, CreateChildInput};
use crate::db::emails::{self, RecordEmailInput};
use crate::db::models::{Child, Email, Note, ParentRecord, ParentWithChildren, ParentWithDetails, Task};
use crate::db::notes::{self, CreateNoteInput};
use crate::db::parents::{
    self, CreateParentInput, ParentListResponse, SearchParams, UpdateParentInput,
};
use crate::db::stats::{self, ParentStats};
use crate::db::tasks::{self, CreateTaskInput};
use crate::db::{timeline, ParentDb, TenantContext};
use crate::error::StorageError;

use super::events::{EventBus, StorageEvent};

fn parent_not_found(parent_id: &str) -> StorageError {
    StorageError::NotFound(format!("Parent {} not found", parent_id))
}

fn validate_email(field: &str, value: Option<&str>) -> Result<(), StorageError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() && !v.contains('@') => Err(StorageError::InvalidInput(format!(
            "{} is not a valid email address",
            field
        ))),
        _ => Ok(()),
    }
}

/// Parent service for business logic
pub struct ParentService {
    db: Arc<ParentDb>,
    events: Arc<EventBus>,
}

impl ParentService {
    pub fn new(db: Arc<ParentDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Filtered, sorted, paged search
    pub fn search(
        &self,
        ctx: &TenantContext,
        params: &SearchParams,
    ) -> Result<ParentListResponse, StorageError> {
        params.validate()?;
        self.db.with_conn(|conn| parents::search_parents(conn, ctx, params))
    }

    /// Parent with children, recent activity and counts
    pub fn get_detail(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
    ) -> Result<ParentWithDetails, StorageError> {
        self.db
            .with_conn(|conn| timeline::parent_detail(conn, ctx, parent_id))?
            .ok_or_else(|| parent_not_found(parent_id))
    }

    pub fn list_children(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
    ) -> Result<Vec<Child>, StorageError> {
        self.db.with_conn(|conn| {
            let parent = parents::find_parent(conn, ctx, parent_id)?
                .ok_or_else(|| parent_not_found(parent_id))?;
            children::list_for_parent(conn, ctx, parent.id)
        })
    }

    /// All notes of a parent, newest first
    pub fn list_notes(&self, ctx: &TenantContext, parent_id: &str) -> Result<Vec<Note>, StorageError> {
        self.db.with_conn(|conn| {
            let parent = parents::find_parent(conn, ctx, parent_id)?
                .ok_or_else(|| parent_not_found(parent_id))?;
            notes::recent_for_parent(conn, ctx, parent.id, None)
        })
    }

    pub fn get_stats(&self, ctx: &TenantContext) -> Result<ParentStats, StorageError> {
        self.db.with_conn(|conn| stats::parent_stats(conn, ctx, Utc::now()))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a parent with its children; always records the intake event
    pub fn create(
        &self,
        ctx: &TenantContext,
        input: CreateParentInput,
    ) -> Result<ParentWithChildren, StorageError> {
        self.validate_create(&input)?;

        let created = self
            .db
            .with_transaction(|conn| parents::create_parent(conn, ctx, input))?;

        self.events.emit(StorageEvent::ParentCreated {
            customer_id: ctx.customer_id().to_string(),
            parent_id: created.parent.parent_id.clone(),
            children: created.children.len(),
        });

        Ok(created)
    }

    /// Partial update; unspecified fields are left unchanged
    pub fn update(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
        input: UpdateParentInput,
    ) -> Result<ParentRecord, StorageError> {
        if let Some(ref name) = input.name {
            if name.trim().is_empty() {
                return Err(StorageError::InvalidInput("name must not be empty".into()));
            }
        }
        validate_email("email", input.email.as_deref())?;
        validate_email("secondary_email", input.secondary_email.as_deref())?;

        let updated = self
            .db
            .with_transaction(|conn| parents::update_parent(conn, ctx, parent_id, input))?
            .ok_or_else(|| parent_not_found(parent_id))?;

        self.events.emit(StorageEvent::ParentUpdated {
            customer_id: ctx.customer_id().to_string(),
            parent_id: updated.parent_id.clone(),
            status: updated.status.to_string(),
            stage: updated.stage.to_string(),
        });

        Ok(updated)
    }

    /// Delete a parent and everything it owns
    pub fn delete(&self, ctx: &TenantContext, parent_id: &str) -> Result<(), StorageError> {
        let deleted = self
            .db
            .with_transaction(|conn| parents::delete_parent(conn, ctx, parent_id))?;
        if !deleted {
            return Err(parent_not_found(parent_id));
        }

        self.events.emit(StorageEvent::ParentDeleted {
            customer_id: ctx.customer_id().to_string(),
            parent_id: parent_id.to_string(),
        });
        Ok(())
    }

    pub fn add_child(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
        input: CreateChildInput,
    ) -> Result<Child, StorageError> {
        input.validate()?;

        let child = self.db.with_transaction(|conn| {
            let parent = parents::find_parent(conn, ctx, parent_id)?
                .ok_or_else(|| parent_not_found(parent_id))?;
            children::insert_child(conn, ctx, parent.id, &input)
        })?;

        self.events.emit(StorageEvent::ChildAdded {
            customer_id: ctx.customer_id().to_string(),
            parent_id: parent_id.to_string(),
            child_id: child.id,
        });
        Ok(child)
    }

    /// Append a note attributed to `user_id`
    pub fn add_note(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
        input: CreateNoteInput,
        user_id: &str,
    ) -> Result<Note, StorageError> {
        input.validate()?;
        if user_id.trim().is_empty() {
            return Err(StorageError::InvalidInput("user_id is required".into()));
        }

        let note = self.db.with_transaction(|conn| {
            let parent = parents::find_parent(conn, ctx, parent_id)?
                .ok_or_else(|| parent_not_found(parent_id))?;
            notes::insert_note(conn, ctx, parent.id, &input, user_id.trim())
        })?;

        self.events.emit(StorageEvent::NoteAdded {
            customer_id: ctx.customer_id().to_string(),
            parent_id: parent_id.to_string(),
            note_id: note.id,
            created_by: note.created_by.clone(),
        });
        Ok(note)
    }

    /// Ingest an email against a parent (importers, mail sync)
    pub fn record_email(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
        input: RecordEmailInput,
    ) -> Result<Email, StorageError> {
        let email = self.db.with_transaction(|conn| {
            let parent = parents::find_parent(conn, ctx, parent_id)?
                .ok_or_else(|| parent_not_found(parent_id))?;
            emails::record_email(conn, ctx, parent.id, &input)
        })?;

        self.events.emit(StorageEvent::EmailRecorded {
            customer_id: ctx.customer_id().to_string(),
            parent_id: parent_id.to_string(),
            direction: email.direction.clone(),
        });
        Ok(email)
    }

    pub fn create_task(
        &self,
        ctx: &TenantContext,
        parent_id: &str,
        input: CreateTaskInput,
    ) -> Result<Task, StorageError> {
        let task = self.db.with_transaction(|conn| {
            let parent = parents::find_parent(conn, ctx, parent_id)?
                .ok_or_else(|| parent_not_found(parent_id))?;
            tasks::create_task(conn, ctx, parent.id, &input)
        })?;

        self.events.emit(StorageEvent::TaskCreated {
            customer_id: ctx.customer_id().to_string(),
            parent_id: parent_id.to_string(),
            task_id: task.id,
        });
        Ok(task)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_create(&self, input: &CreateParentInput) -> Result<(), StorageError> {
        if input.name.trim().is_empty() {
            return Err(StorageError::InvalidInput("name is required".into()));
        }
        validate_email("email", input.email.as_deref())?;
        validate_email("secondary_email", input.secondary_email.as_deref())?;
        for (i, child) in input.children.iter().enumerate() {
            child
                .validate()
                .map_err(|e| StorageError::InvalidInput(format!("children[{}]: {}", i, e)))?;
        }
        Ok(())
    }
}
