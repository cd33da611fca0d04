//! Stats aggregator: funnel distributions and rollups for one tenant
//!
//! One projection query loads the tenant's population; everything else is a
//! pure fold over those rows so every grouping sums over the same set.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;
use ts_rs::TS;

use super::context::TenantContext;
use super::diesel_schema::parents;
use super::lifecycle::{self, ParentStatus};
use super::models::ParentStatsRow;
use crate::error::StorageError;

/// Trailing window for `recent_enquiries_7d`
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Aggregate statistics over a tenant's parents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ParentStats {
    #[ts(type = "number")]
    pub total_parents: i64,
    #[ts(type = "Record<string, number>")]
    pub by_status: BTreeMap<String, i64>,
    #[ts(type = "Record<string, number>")]
    pub by_stage: BTreeMap<String, i64>,
    /// Parents without a source are not counted here
    #[ts(type = "Record<string, number>")]
    pub by_source: BTreeMap<String, i64>,
    pub average_lead_score: f64,
    #[ts(type = "number")]
    pub high_risk_count: i64,
    #[ts(type = "number")]
    pub recent_enquiries_7d: i64,
    /// Enrolled share of all parents, as a percentage
    pub conversion_rate: f64,
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl ParentStats {
    /// Fold projection rows into stats, evaluating recency against `now`
    pub fn aggregate(rows: &[ParentStatsRow], now: DateTime<Utc>) -> Self {
        let mut stats = ParentStats {
            total_parents: rows.len() as i64,
            ..Default::default()
        };
        if rows.is_empty() {
            return stats;
        }

        let window_start = now - Duration::days(RECENT_WINDOW_DAYS);
        let mut score_sum: i64 = 0;
        let mut enrolled: i64 = 0;

        for row in rows {
            *stats.by_status.entry(row.status.clone()).or_default() += 1;
            *stats.by_stage.entry(row.stage.clone()).or_default() += 1;
            if let Some(ref source) = row.source {
                *stats.by_source.entry(source.clone()).or_default() += 1;
            }

            score_sum += i64::from(row.lead_score);
            if lifecycle::is_high_risk(row.risk_score) {
                stats.high_risk_count += 1;
            }
            if row.status == ParentStatus::Enrolled.as_str() {
                enrolled += 1;
            }

            match DateTime::parse_from_rfc3339(&row.created_at) {
                Ok(created) if created.with_timezone(&Utc) >= window_start => {
                    stats.recent_enquiries_7d += 1;
                }
                Ok(_) => {}
                Err(e) => warn!(created_at = %row.created_at, error = %e, "Unparseable created_at"),
            }
        }

        let total = stats.total_parents as f64;
        stats.average_lead_score = round_one_decimal(score_sum as f64 / total);
        stats.conversion_rate = round_one_decimal(enrolled as f64 / total * 100.0);
        stats
    }
}

/// Load the tenant's population and aggregate it
pub fn parent_stats(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    now: DateTime<Utc>,
) -> Result<ParentStats, StorageError> {
    let rows: Vec<ParentStatsRow> = parents::table
        .filter(parents::customer_id.eq(ctx.customer_id()))
        .select(ParentStatsRow::as_select())
        .load(conn)
        .map_err(|e| StorageError::query("Stats query failed", e))?;

    Ok(ParentStats::aggregate(&rows, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, source: Option<&str>, lead: i32, risk: i32, created_at: &str) -> ParentStatsRow {
        ParentStatsRow {
            status: status.into(),
            stage: "awareness".into(),
            source: source.map(Into::into),
            lead_score: lead,
            risk_score: risk,
            created_at: created_at.into(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-15T12:00:00.000Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_empty_population_is_all_zero() {
        let stats = ParentStats::aggregate(&[], now());
        assert_eq!(stats, ParentStats::default());
        assert_eq!(stats.conversion_rate, 0.0);
        assert_eq!(stats.average_lead_score, 0.0);
    }

    #[test]
    fn test_conversion_rate_one_decimal() {
        let rows = vec![
            row("lead", Some("website"), 10, 0, "2024-06-14T09:00:00.000Z"),
            row("lead", None, 20, 75, "2024-05-01T09:00:00.000Z"),
            row("enrolled", Some("website"), 31, 71, "2024-06-08T12:00:00.000Z"),
        ];
        let stats = ParentStats::aggregate(&rows, now());

        assert_eq!(stats.total_parents, 3);
        assert_eq!(stats.by_status.get("lead"), Some(&2));
        assert_eq!(stats.by_status.get("enrolled"), Some(&1));
        assert_eq!(stats.by_status.len(), 2);
        assert_eq!(stats.by_stage.values().sum::<i64>(), 3);
        assert_eq!(stats.by_source.values().sum::<i64>(), 2);
        assert_eq!(stats.conversion_rate, 33.3);
        assert_eq!(stats.average_lead_score, 20.3);
        assert_eq!(stats.high_risk_count, 2);
        // Exactly seven days back is still inside the window
        assert_eq!(stats.recent_enquiries_7d, 2);
    }

    #[test]
    fn test_risk_threshold_is_exclusive() {
        let rows = vec![row("lead", None, 0, 70, "2024-06-15T00:00:00.000Z")];
        assert_eq!(ParentStats::aggregate(&rows, now()).high_risk_count, 0);
    }
}
