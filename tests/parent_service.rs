//! End-to-end scenarios through ParentService against an on-disk database

use std::sync::Arc;
use std::time::Duration;

use admissions_crm::db::children::CreateChildInput;
use admissions_crm::db::diesel_schema::{children, journey_events, notes, parent_tags, parents};
use admissions_crm::db::notes::CreateNoteInput;
use admissions_crm::db::{
    CreateParentInput, ParentFilter, ParentStatus, SearchParams, SortOrder, TenantContext,
};
use admissions_crm::services::EventBus;
use admissions_crm::{ParentDb, ParentService, StorageError};
use diesel::prelude::*;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    db: Arc<ParentDb>,
    svc: ParentService,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(ParentDb::open(&dir.path().join("crm.db"), 4, Duration::from_secs(5)).unwrap());
    let svc = ParentService::new(db.clone(), Arc::new(EventBus::new()));
    Harness { _dir: dir, db, svc }
}

fn tenant(id: &str) -> TenantContext {
    TenantContext::new(id).unwrap()
}

fn parent(name: &str) -> CreateParentInput {
    CreateParentInput {
        name: name.into(),
        ..Default::default()
    }
}

fn child(name: &str) -> CreateChildInput {
    CreateChildInput {
        name: name.into(),
        ..Default::default()
    }
}

fn search(h: &Harness, ctx: &TenantContext, filter: ParentFilter) -> Vec<String> {
    let params = SearchParams {
        filter,
        per_page: 100,
        ..Default::default()
    };
    h.svc
        .search(ctx, &params)
        .unwrap()
        .parents
        .into_iter()
        .map(|p| p.parent.name)
        .collect()
}

#[test]
fn tenants_never_see_each_other() {
    let h = harness();
    let t1 = tenant("T1");
    let t2 = tenant("T2");

    let mine = h.svc.create(&t1, parent("Alice Jones")).unwrap();
    h.svc.create(&t2, parent("Alice Smith")).unwrap();

    let found = search(
        &h,
        &t1,
        ParentFilter {
            query: Some("alice".into()),
            ..Default::default()
        },
    );
    assert_eq!(found, vec!["Alice Jones"]);

    assert!(matches!(
        h.svc.get_detail(&t2, &mine.parent.parent_id),
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        h.svc.delete(&t2, &mine.parent.parent_id),
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(h.svc.get_stats(&t1).unwrap().total_parents, 1);
    assert_eq!(h.svc.get_stats(&t2).unwrap().total_parents, 1);
}

#[test]
fn stats_groupings_and_conversion() {
    let h = harness();
    let ctx = tenant("T1");

    let empty = h.svc.get_stats(&ctx).unwrap();
    assert_eq!(empty.total_parents, 0);
    assert_eq!(empty.conversion_rate, 0.0);

    for (name, status, source) in [
        ("A", ParentStatus::Lead, Some("website")),
        ("B", ParentStatus::Lead, None),
        ("C", ParentStatus::Enrolled, Some("referral")),
    ] {
        let mut input = parent(name);
        input.status = status;
        input.source = source.map(Into::into);
        h.svc.create(&ctx, input).unwrap();
    }

    let stats = h.svc.get_stats(&ctx).unwrap();
    assert_eq!(stats.total_parents, 3);
    assert_eq!(stats.by_status.get("lead"), Some(&2));
    assert_eq!(stats.by_status.get("enrolled"), Some(&1));
    assert_eq!(stats.by_status.values().sum::<i64>(), 3);
    assert_eq!(stats.by_stage.values().sum::<i64>(), 3);
    // one parent has no source
    assert_eq!(stats.by_source.values().sum::<i64>(), 2);
    assert_eq!(stats.conversion_rate, 33.3);
    assert_eq!(stats.recent_enquiries_7d, 3);
}

#[test]
fn pagination_reports_ceil_pages_and_empty_tail() {
    let h = harness();
    let ctx = tenant("T1");
    for i in 0..5 {
        h.svc.create(&ctx, parent(&format!("Parent {}", i))).unwrap();
    }

    let mut params = SearchParams {
        per_page: 2,
        ..Default::default()
    };
    let first = h.svc.search(&ctx, &params).unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.pages, 3);
    assert_eq!(first.parents.len(), 2);

    params.page = 3;
    assert_eq!(h.svc.search(&ctx, &params).unwrap().parents.len(), 1);

    params.page = 9;
    let beyond = h.svc.search(&ctx, &params).unwrap();
    assert!(beyond.parents.is_empty());
    assert_eq!(beyond.total, 5);
    assert_eq!(beyond.pages, 3);
}

#[test]
fn tags_are_conjunctive() {
    let h = harness();
    let ctx = tenant("T1");

    let mut both = parent("Both");
    both.tags = vec!["vip".into(), "urgent".into()];
    h.svc.create(&ctx, both).unwrap();

    let mut one = parent("One");
    one.tags = vec!["vip".into()];
    h.svc.create(&ctx, one).unwrap();

    let found = search(
        &h,
        &ctx,
        ParentFilter {
            tags: vec!["vip".into(), "urgent".into()],
            ..Default::default()
        },
    );
    assert_eq!(found, vec!["Both"]);

    let vip = search(
        &h,
        &ctx,
        ParentFilter {
            tags: vec!["vip".into()],
            ..Default::default()
        },
    );
    assert_eq!(vip.len(), 2);
}

#[test]
fn child_name_match_returns_parent_once() {
    let h = harness();
    let ctx = tenant("T1");

    let mut twins = parent("Mrs Patel");
    twins.children = vec![child("Olivia Patel"), child("Olivia-Mae Patel")];
    h.svc.create(&ctx, twins).unwrap();
    h.svc.create(&ctx, parent("Mr Brown")).unwrap();

    let params = SearchParams {
        filter: ParentFilter {
            query: Some("olivia".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let page = h.svc.search(&ctx, &params).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.parents.len(), 1);
    assert_eq!(page.parents[0].children.len(), 2);
}

#[test]
fn creation_records_single_enquiry_event() {
    let h = harness();
    let ctx = tenant("T1");

    let mut input = parent("A. Smith");
    input.children = vec![child("Sam")];
    let created = h.svc.create(&ctx, input).unwrap();
    assert!(created.parent.parent_id.starts_with("PARENT-"));
    assert!(created.parent.first_contact_date.is_some());

    let detail = h.svc.get_detail(&ctx, &created.parent.parent_id).unwrap();
    assert_eq!(detail.journey_events.len(), 1);
    assert_eq!(detail.journey_events[0].event_type, "enquiry");
    assert_eq!(detail.email_count, 0);
    assert_eq!(detail.task_count, 0);
    assert_eq!(detail.children.len(), 1);
}

#[test]
fn inverted_score_range_matches_nothing() {
    let h = harness();
    let ctx = tenant("T1");
    let mut input = parent("Scored");
    input.lead_score = 50;
    h.svc.create(&ctx, input).unwrap();

    let found = search(
        &h,
        &ctx,
        ParentFilter {
            min_lead_score: Some(80),
            max_lead_score: Some(10),
            ..Default::default()
        },
    );
    assert!(found.is_empty());
}

#[test]
fn delete_removes_owned_rows() {
    let h = harness();
    let ctx = tenant("T1");

    let mut input = parent("Leaving");
    input.tags = vec!["vip".into()];
    input.children = vec![child("One"), child("Two")];
    let created = h.svc.create(&ctx, input).unwrap();
    let id = created.parent.parent_id.clone();
    for i in 0..3 {
        h.svc
            .add_note(&ctx, &id, CreateNoteInput::new(&format!("note {}", i)), "user-1")
            .unwrap();
    }
    let kept = h.svc.create(&ctx, parent("Staying")).unwrap();
    h.svc.add_child(&ctx, &kept.parent.parent_id, child("Kid")).unwrap();

    h.svc.delete(&ctx, &id).unwrap();

    assert!(matches!(h.svc.get_detail(&ctx, &id), Err(StorageError::NotFound(_))));
    let counts = h
        .db
        .with_conn(|conn| {
            Ok((
                parents::table.count().get_result::<i64>(conn)?,
                children::table.count().get_result::<i64>(conn)?,
                notes::table.count().get_result::<i64>(conn)?,
                journey_events::table.count().get_result::<i64>(conn)?,
                parent_tags::table.count().get_result::<i64>(conn)?,
            ))
        })
        .unwrap();
    assert_eq!(counts, (1, 1, 0, 1, 0));
}

#[test]
fn unknown_sort_field_falls_back_to_newest_first() {
    let h = harness();
    let ctx = tenant("T1");
    for name in ["First", "Second", "Third"] {
        h.svc.create(&ctx, parent(name)).unwrap();
    }

    let unknown = SearchParams {
        sort_by: Some("favourite_colour".into()),
        sort_order: SortOrder::Asc,
        ..Default::default()
    };
    let names: Vec<String> = h
        .svc
        .search(&ctx, &unknown)
        .unwrap()
        .parents
        .into_iter()
        .map(|p| p.parent.name)
        .collect();
    assert_eq!(names, vec!["Third", "Second", "First"]);

    let by_name = SearchParams {
        sort_by: Some("name".into()),
        sort_order: SortOrder::Asc,
        ..Default::default()
    };
    let names: Vec<String> = h
        .svc
        .search(&ctx, &by_name)
        .unwrap()
        .parents
        .into_iter()
        .map(|p| p.parent.name)
        .collect();
    assert_eq!(names, vec!["First", "Second", "Third"]);
}
