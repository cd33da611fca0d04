//! Timeline builder: a parent's detail view assembled from its activity
//!
//! Four lists, each capped and ordered on its own (children, emails, notes,
//! journey events), plus the total email count and open task count. They are
//! not merged into one feed.

use diesel::prelude::*;

use super::context::TenantContext;
use super::models::{ParentRecord, ParentWithDetails};
use super::{children, emails, journey_events, notes, parents, tasks};
use crate::error::StorageError;

pub const RECENT_EMAILS: i64 = 10;
pub const RECENT_NOTES: i64 = 5;
pub const RECENT_JOURNEY_EVENTS: i64 = 10;

/// Build the detail view; `None` when the parent is not in the tenant
pub fn parent_detail(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    parent_id: &str,
) -> Result<Option<ParentWithDetails>, StorageError> {
    let row = match parents::find_parent(conn, ctx, parent_id)? {
        Some(row) => row,
        None => return Ok(None),
    };
    let pk = row.id;

    let tags = parents::get_tags(conn, ctx, pk)?;
    let kids = children::list_for_parent(conn, ctx, pk)?;
    let recent_emails = emails::recent_for_parent(conn, ctx, pk, RECENT_EMAILS)?;
    let recent_notes = notes::recent_for_parent(conn, ctx, pk, Some(RECENT_NOTES))?;
    let events = journey_events::recent_for_parent(conn, ctx, pk, RECENT_JOURNEY_EVENTS)?;
    let email_count = emails::count_for_parent(conn, ctx, pk)?;
    let task_count = tasks::open_count_for_parent(conn, ctx, pk)?;

    Ok(Some(ParentWithDetails {
        parent: ParentRecord::from_row(row, tags)?,
        children: kids,
        recent_emails,
        recent_notes,
        journey_events: events,
        email_count,
        task_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::emails::RecordEmailInput;
    use crate::db::notes::CreateNoteInput;
    use crate::db::parents::{create_parent, CreateParentInput};
    use crate::db::tasks::CreateTaskInput;
    use crate::db::ParentDb;

    #[test]
    fn test_new_parent_has_intake_only() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        let created = db
            .with_conn(|conn| {
                let input = CreateParentInput {
                    name: "A. Smith".into(),
                    ..Default::default()
                };
                create_parent(conn, &ctx, input)
            })
            .unwrap();

        let detail = db
            .with_conn(|conn| parent_detail(conn, &ctx, &created.parent.parent_id))
            .unwrap()
            .unwrap();
        assert_eq!(detail.email_count, 0);
        assert_eq!(detail.task_count, 0);
        assert_eq!(detail.journey_events.len(), 1);
        assert_eq!(detail.journey_events[0].event_type, "enquiry");
        assert!(detail.recent_emails.is_empty());
        assert!(detail.recent_notes.is_empty());
    }

    #[test]
    fn test_lists_are_capped_independently() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        let created = db
            .with_conn(|conn| {
                let input = CreateParentInput {
                    name: "Busy Family".into(),
                    ..Default::default()
                };
                create_parent(conn, &ctx, input)
            })
            .unwrap();
        let pk = created.parent.id;

        db.with_conn(|conn| {
            for i in 0..12 {
                emails::record_email(conn, &ctx, pk, &RecordEmailInput::inbound("p@example.com", format!("e{}", i)))?;
            }
            for i in 0..6 {
                notes::insert_note(conn, &ctx, pk, &CreateNoteInput::new(format!("n{}", i)), "user-1")?;
            }
            tasks::create_task(conn, &ctx, pk, &CreateTaskInput::new("Call"))?;
            Ok(())
        })
        .unwrap();

        let detail = db
            .with_conn(|conn| parent_detail(conn, &ctx, &created.parent.parent_id))
            .unwrap()
            .unwrap();
        assert_eq!(detail.recent_emails.len(), 10);
        assert_eq!(detail.email_count, 12);
        assert_eq!(detail.recent_notes.len(), 5);
        assert_eq!(detail.recent_notes[0].content, "n5");
        assert_eq!(detail.task_count, 1);

        let other = TenantContext::new("T2").unwrap();
        let hidden = db
            .with_conn(|conn| parent_detail(conn, &other, &created.parent.parent_id))
            .unwrap();
        assert!(hidden.is_none());
    }
}
