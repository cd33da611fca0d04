//! Manual notes - append-only, attributed to the user who wrote them

use diesel::prelude::*;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::notes;
use super::models::{current_timestamp, NewNote, Note};
use crate::error::StorageError;

/// Input for adding a note to a parent
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNoteInput {
    pub content: String,
    #[serde(default = "default_note_type")]
    pub note_type: String,
}

fn default_note_type() -> String {
    "general".to_string()
}

impl CreateNoteInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            note_type: default_note_type(),
        }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.content.trim().is_empty() {
            return Err(StorageError::InvalidInput("note content is required".into()));
        }
        if self.note_type.trim().is_empty() {
            return Err(StorageError::InvalidInput("note_type must not be empty".into()));
        }
        Ok(())
    }
}

/// Append a note for an already-resolved parent row id
pub fn insert_note(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    input: &CreateNoteInput,
    created_by: &str,
) -> Result<Note, StorageError> {
    let now = current_timestamp();
    let new_note = NewNote {
        customer_id: ctx.customer_id(),
        parent_id: parent_pk,
        content: &input.content,
        note_type: &input.note_type,
        created_by,
        created_at: &now,
    };

    diesel::insert_into(notes::table)
        .values(&new_note)
        .execute(conn)
        .map_err(|e| StorageError::query("Note insert failed", e))?;

    notes::table
        .filter(notes::customer_id.eq(ctx.customer_id()))
        .filter(notes::parent_id.eq(parent_pk))
        .order(notes::id.desc())
        .select(Note::as_select())
        .first(conn)
        .map_err(|e| StorageError::query("Note fetch failed", e))
}

/// Most recent notes first; `limit` of `None` returns all of them
pub fn recent_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
    limit: Option<i64>,
) -> Result<Vec<Note>, StorageError> {
    let mut query = notes::table
        .filter(notes::customer_id.eq(ctx.customer_id()))
        .filter(notes::parent_id.eq(parent_pk))
        .order((notes::created_at.desc(), notes::id.desc()))
        .select(Note::as_select())
        .into_boxed();

    if let Some(limit) = limit {
        query = query.limit(limit);
    }

    query
        .load(conn)
        .map_err(|e| StorageError::query("Notes query failed", e))
}

pub fn delete_for_parent(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_pk: i32,
) -> Result<usize, StorageError> {
    diesel::delete(
        notes::table
            .filter(notes::customer_id.eq(ctx.customer_id()))
            .filter(notes::parent_id.eq(parent_pk)),
    )
    .execute(conn)
    .map_err(|e| StorageError::query("Notes delete failed", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::parents::{create_parent, CreateParentInput};
    use crate::db::ParentDb;

    #[test]
    fn test_recent_notes_newest_first() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();

        let pk = db
            .with_transaction(|conn| {
                let input = CreateParentInput {
                    name: "A. Smith".into(),
                    ..Default::default()
                };
                Ok(create_parent(conn, &ctx, input)?.parent.id)
            })
            .unwrap();

        db.with_conn(|conn| {
            for i in 0..7 {
                insert_note(conn, &ctx, pk, &CreateNoteInput::new(format!("note {}", i)), "user-1")?;
            }
            Ok(())
        })
        .unwrap();

        let recent = db.with_conn(|conn| recent_for_parent(conn, &ctx, pk, Some(5))).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "note 6");
        assert_eq!(recent[0].note_type, "general");
        assert_eq!(recent[0].created_by, "user-1");

        let all = db.with_conn(|conn| recent_for_parent(conn, &ctx, pk, None)).unwrap();
        assert_eq!(all.len(), 7);
    }

    #[test]
    fn test_note_type_defaults_to_general() {
        let input: CreateNoteInput = serde_json::from_str(r#"{"content":"Called back"}"#).unwrap();
        assert_eq!(input.note_type, "general");
        assert!(CreateNoteInput::new(" ").validate().is_err());
    }
}
