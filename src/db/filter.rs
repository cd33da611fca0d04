//! Filter compiler: structured search request → tenant-scoped boxed query
//!
//! Each filter is optional and narrows the query independently. With no
//! filters the compiled query is simply "every parent of this tenant".
//! Child-name and tag matches go through `IN (subselect)` so a parent is
//! never duplicated by the rows that matched it.

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use diesel::sqlite::Sqlite;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::{children, parent_tags, parents};
use super::lifecycle::{ParentStage, ParentStatus};
use crate::error::StorageError;

pub type ParentQuery<'a> = parents::BoxedQuery<'a, Sqlite>;

/// Escape character for LIKE patterns built from user text
const LIKE_ESCAPE: char = '\\';

// SQLite's LOWER() and LIKE only fold ASCII; these fold the full Unicode range.
diesel::define_sql_function! {
    fn fold_case(text: Text) -> Text;
}

diesel::define_sql_function! {
    fn fold_case_nullable(text: Nullable<Text>) -> Nullable<Text>;
}

/// Register the case-folding functions on a freshly opened connection
pub fn register_text_functions(conn: &mut SqliteConnection) -> QueryResult<()> {
    fold_case_utils::register_impl(conn, |text: String| text.to_lowercase())?;
    fold_case_nullable_utils::register_impl(conn, |text: Option<String>| {
        text.map(|t| t.to_lowercase())
    })
}

/// Quote LIKE wildcards so user text only ever matches literally
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Optional narrowing criteria for a parent search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParentFilter {
    /// Case-insensitive substring over name, contact fields, partner and child names
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub status: Option<ParentStatus>,
    #[serde(default)]
    pub stage: Option<ParentStage>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub min_lead_score: Option<i32>,
    #[serde(default)]
    pub max_lead_score: Option<i32>,
    /// Every tag must be present on the parent
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_after: Option<NaiveDate>,
    #[serde(default)]
    pub created_before: Option<NaiveDate>,
    #[serde(default)]
    pub has_children: Option<bool>,
}

impl ParentFilter {
    fn text_pattern(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(&q.to_lowercase())))
    }
}

/// Build the filtered, tenant-scoped query (no ordering or window)
pub fn compile<'a>(ctx: &'a TenantContext, filter: &'a ParentFilter) -> ParentQuery<'a> {
    let mut query = parents::table
        .filter(parents::customer_id.eq(ctx.customer_id()))
        .into_boxed();

    if let Some(pattern) = filter.text_pattern() {
        let child_matches = children::table
            .filter(children::customer_id.eq(ctx.customer_id()))
            .filter(fold_case(children::name).like(pattern.clone()).escape(LIKE_ESCAPE))
            .select(children::parent_id);

        query = query.filter(
            fold_case(parents::name)
                .like(pattern.clone())
                .escape(LIKE_ESCAPE)
                .or(fold_case_nullable(parents::email)
                    .like(pattern.clone())
                    .escape(LIKE_ESCAPE))
                .or(fold_case_nullable(parents::phone)
                    .like(pattern.clone())
                    .escape(LIKE_ESCAPE))
                .or(fold_case_nullable(parents::partner_name)
                    .like(pattern)
                    .escape(LIKE_ESCAPE))
                .or(parents::id.eq_any(child_matches)),
        );
    }

    if let Some(status) = filter.status {
        query = query.filter(parents::status.eq(status.as_str()));
    }

    if let Some(stage) = filter.stage {
        query = query.filter(parents::stage.eq(stage.as_str()));
    }

    if let Some(ref source) = filter.source {
        query = query.filter(parents::source.eq(source));
    }

    if let Some(min) = filter.min_lead_score {
        query = query.filter(parents::lead_score.ge(min));
    }

    if let Some(max) = filter.max_lead_score {
        query = query.filter(parents::lead_score.le(max));
    }

    for tag in &filter.tags {
        let tagged = parent_tags::table
            .filter(parent_tags::customer_id.eq(ctx.customer_id()))
            .filter(parent_tags::tag.eq(tag))
            .select(parent_tags::parent_id);
        query = query.filter(parents::id.eq_any(tagged));
    }

    // Timestamps are ISO text, so a bare date compares as that day's midnight
    if let Some(after) = filter.created_after {
        query = query.filter(parents::created_at.ge(after.format("%Y-%m-%d").to_string()));
    }

    if let Some(before) = filter.created_before {
        query = query.filter(parents::created_at.le(before.format("%Y-%m-%d").to_string()));
    }

    if let Some(has_children) = filter.has_children {
        let with_children = children::table
            .filter(children::customer_id.eq(ctx.customer_id()))
            .select(children::parent_id);
        query = if has_children {
            query.filter(parents::id.eq_any(with_children))
        } else {
            query.filter(parents::id.ne_all(with_children))
        };
    }

    query
}

// ============================================================================
// Sorting
// ============================================================================

/// Columns a parent search may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Name,
    Email,
    Status,
    Stage,
    Source,
    LeadScore,
    EngagementScore,
    RiskScore,
    FirstContactDate,
    LastContactDate,
    ParentId,
}

impl SortField {
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name {
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "name" => SortField::Name,
            "email" => SortField::Email,
            "status" => SortField::Status,
            "stage" => SortField::Stage,
            "source" => SortField::Source,
            "lead_score" => SortField::LeadScore,
            "engagement_score" => SortField::EngagementScore,
            "risk_score" => SortField::RiskScore,
            "first_contact_date" => SortField::FirstContactDate,
            "last_contact_date" => SortField::LastContactDate,
            "parent_id" => SortField::ParentId,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(StorageError::InvalidInput(format!(
                "sort_order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

/// Resolve a requested sort; unknown field names fall back to newest first
pub fn resolve_sort(sort_by: Option<&str>, order: SortOrder) -> (SortField, SortOrder) {
    match sort_by {
        None => (SortField::CreatedAt, order),
        Some(name) => match SortField::from_name(name) {
            Some(field) => (field, order),
            None => {
                tracing::debug!(sort_by = name, "Unknown sort field, using created_at desc");
                (SortField::CreatedAt, SortOrder::Desc)
            }
        },
    }
}

macro_rules! order_by {
    ($query:expr, $column:expr, $order:expr) => {
        match $order {
            SortOrder::Asc => $query
                .order($column.asc())
                .then_order_by(parents::id.asc()),
            SortOrder::Desc => $query
                .order($column.desc())
                .then_order_by(parents::id.desc()),
        }
    };
}

/// Order a compiled query; row id breaks ties so paging is stable
pub fn apply_sort<'a>(query: ParentQuery<'a>, field: SortField, order: SortOrder) -> ParentQuery<'a> {
    match field {
        SortField::CreatedAt => order_by!(query, parents::created_at, order),
        SortField::UpdatedAt => order_by!(query, parents::updated_at, order),
        SortField::Name => order_by!(query, parents::name, order),
        SortField::Email => order_by!(query, parents::email, order),
        SortField::Status => order_by!(query, parents::status, order),
        SortField::Stage => order_by!(query, parents::stage, order),
        SortField::Source => order_by!(query, parents::source, order),
        SortField::LeadScore => order_by!(query, parents::lead_score, order),
        SortField::EngagementScore => order_by!(query, parents::engagement_score, order),
        SortField::RiskScore => order_by!(query, parents::risk_score, order),
        SortField::FirstContactDate => order_by!(query, parents::first_contact_date, order),
        SortField::LastContactDate => order_by!(query, parents::last_contact_date, order),
        SortField::ParentId => order_by!(query, parents::parent_id, order),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::children::CreateChildInput;
    use crate::db::parents::{create_parent, CreateParentInput};
    use crate::db::ParentDb;

    fn matching_names(db: &ParentDb, ctx: &TenantContext, filter: &ParentFilter) -> Vec<String> {
        db.with_conn(|conn| {
            apply_sort(compile(ctx, filter), SortField::Name, SortOrder::Asc)
                .select(parents::name)
                .load::<String>(conn)
                .map_err(StorageError::from)
        })
        .unwrap()
    }

    fn seed(db: &ParentDb, ctx: &TenantContext, name: &str, tags: &[&str], kids: &[&str]) {
        let input = CreateParentInput {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            children: kids
                .iter()
                .map(|k| CreateChildInput {
                    name: k.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        db.with_transaction(|conn| create_parent(conn, ctx, input)).unwrap();
    }

    #[test]
    fn test_no_filters_returns_whole_tenant() {
        let db = ParentDb::open_in_memory().unwrap();
        let t1 = TenantContext::new("T1").unwrap();
        let t2 = TenantContext::new("T2").unwrap();
        seed(&db, &t1, "Alice", &[], &[]);
        seed(&db, &t1, "Bob", &[], &[]);
        seed(&db, &t2, "Carol", &[], &[]);

        let names = matching_names(&db, &t1, &ParentFilter::default());
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_tags_are_conjunctive() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        seed(&db, &ctx, "Only VIP", &["vip"], &[]);
        seed(&db, &ctx, "Both", &["urgent", "vip"], &[]);

        let filter = ParentFilter {
            tags: vec!["vip".into(), "urgent".into()],
            ..Default::default()
        };
        assert_eq!(matching_names(&db, &ctx, &filter), vec!["Both"]);
    }

    #[test]
    fn test_text_matches_child_name_once() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        seed(&db, &ctx, "Jones", &[], &["Oliver Jr", "Olivia"]);
        seed(&db, &ctx, "Brown", &[], &["Sam"]);

        let filter = ParentFilter {
            query: Some("OLIV".into()),
            ..Default::default()
        };
        assert_eq!(matching_names(&db, &ctx, &filter), vec!["Jones"]);
    }

    #[test]
    fn test_text_ignores_case_beyond_ascii() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        seed(&db, &ctx, "Élodie Durand", &[], &[]);
        seed(&db, &ctx, "Müller", &[], &["Ørjan"]);
        seed(&db, &ctx, "Brown", &[], &[]);

        for (query, expected) in [
            ("élodie", "Élodie Durand"),
            ("ÉLODIE", "Élodie Durand"),
            ("MÜLL", "Müller"),
            ("ørjan", "Müller"),
        ] {
            let filter = ParentFilter {
                query: Some(query.into()),
                ..Default::default()
            };
            assert_eq!(matching_names(&db, &ctx, &filter), vec![expected], "query {}", query);
        }
    }

    #[test]
    fn test_text_wildcards_match_literally() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        seed(&db, &ctx, "Axb Family", &[], &[]);
        seed(&db, &ctx, "A_b Trust", &[], &[]);
        seed(&db, &ctx, "100% Parents", &[], &[]);

        let search = |q: &str| {
            matching_names(
                &db,
                &ctx,
                &ParentFilter {
                    query: Some(q.into()),
                    ..Default::default()
                },
            )
        };
        assert_eq!(search("a_b"), vec!["A_b Trust"]);
        assert_eq!(search("%"), vec!["100% Parents"]);
        assert!(search("\\").is_empty());
    }

    #[test]
    fn test_has_children_uses_existence() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        seed(&db, &ctx, "With", &[], &["Kid One", "Kid Two"]);
        seed(&db, &ctx, "Without", &[], &[]);

        let with = ParentFilter {
            has_children: Some(true),
            ..Default::default()
        };
        let without = ParentFilter {
            has_children: Some(false),
            ..Default::default()
        };
        assert_eq!(matching_names(&db, &ctx, &with), vec!["With"]);
        assert_eq!(matching_names(&db, &ctx, &without), vec!["Without"]);
    }

    #[test]
    fn test_blank_query_is_ignored() {
        let db = ParentDb::open_in_memory().unwrap();
        let ctx = TenantContext::new("T1").unwrap();
        seed(&db, &ctx, "Alice", &[], &[]);

        let filter = ParentFilter {
            query: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(matching_names(&db, &ctx, &filter).len(), 1);
    }

    #[test]
    fn test_unknown_sort_falls_back_to_created_desc() {
        assert_eq!(
            resolve_sort(Some("favourite_colour"), SortOrder::Asc),
            (SortField::CreatedAt, SortOrder::Desc)
        );
        assert_eq!(
            resolve_sort(Some("lead_score"), SortOrder::Asc),
            (SortField::LeadScore, SortOrder::Asc)
        );
        assert_eq!(resolve_sort(None, SortOrder::Desc), (SortField::CreatedAt, SortOrder::Desc));
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!(matches!(
            "sideways".parse::<SortOrder>(),
            Err(StorageError::InvalidInput(_))
        ));
    }
}
