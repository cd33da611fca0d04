//! Funnel lifecycle: status and stage values, risk classification and the
//! journey events that lifecycle changes leave behind.
//!
//! Status and stage are independent and freely settable; nothing here enforces
//! a transition table. What this module owns is the bookkeeping around a
//! change: which audit event gets recorded, what impact it carries, and how
//! that impact feeds the advisory engagement score.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::StorageError;

/// Risk scores strictly above this value classify a parent as high risk
pub const HIGH_RISK_THRESHOLD: i32 = 70;

/// Upper bound the lifecycle applies when it adjusts scores itself
pub const SCORE_CEILING: i32 = 100;

/// Actor recorded on system-generated journey events
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Intake event recorded exactly once when a parent is created
pub mod intake {
    pub const EVENT_TYPE: &str = "enquiry";
    pub const EVENT_SUBTYPE: &str = "api_created";
    pub const TITLE: &str = "Parent record created";
    pub const DESCRIPTION: &str = "Parent record created via API";
    pub const IMPACT_SCORE: i32 = 5;
}

/// Event types recorded when an update moves a parent through the funnel
pub mod transition_types {
    pub const STATUS_CHANGE: &str = "status_change";
    pub const STAGE_CHANGE: &str = "stage_change";
}

/// Coarse funnel outcome of a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum ParentStatus {
    Lead,
    Warm,
    Applicant,
    OfferMade,
    Enrolled,
    Lost,
    Alumni,
}

impl ParentStatus {
    pub const ALL: [ParentStatus; 7] = [
        ParentStatus::Lead,
        ParentStatus::Warm,
        ParentStatus::Applicant,
        ParentStatus::OfferMade,
        ParentStatus::Enrolled,
        ParentStatus::Lost,
        ParentStatus::Alumni,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParentStatus::Lead => "lead",
            ParentStatus::Warm => "warm",
            ParentStatus::Applicant => "applicant",
            ParentStatus::OfferMade => "offer_made",
            ParentStatus::Enrolled => "enrolled",
            ParentStatus::Lost => "lost",
            ParentStatus::Alumni => "alumni",
        }
    }

    /// Position on the main line lead → enrolled; side branches have none
    pub fn rank(&self) -> Option<u8> {
        match self {
            ParentStatus::Lead => Some(0),
            ParentStatus::Warm => Some(1),
            ParentStatus::Applicant => Some(2),
            ParentStatus::OfferMade => Some(3),
            ParentStatus::Enrolled => Some(4),
            ParentStatus::Lost | ParentStatus::Alumni => None,
        }
    }

}

impl Default for ParentStatus {
    fn default() -> Self {
        ParentStatus::Lead
    }
}

impl std::fmt::Display for ParentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParentStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParentStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StorageError::InvalidInput(format!("unknown parent status '{}'", s)))
    }
}

/// Marketing-funnel position of a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum ParentStage {
    Awareness,
    Interest,
    Consideration,
    Intent,
    Evaluation,
    Enrolled,
}

impl ParentStage {
    pub const ALL: [ParentStage; 6] = [
        ParentStage::Awareness,
        ParentStage::Interest,
        ParentStage::Consideration,
        ParentStage::Intent,
        ParentStage::Evaluation,
        ParentStage::Enrolled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParentStage::Awareness => "awareness",
            ParentStage::Interest => "interest",
            ParentStage::Consideration => "consideration",
            ParentStage::Intent => "intent",
            ParentStage::Evaluation => "evaluation",
            ParentStage::Enrolled => "enrolled",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            ParentStage::Awareness => 0,
            ParentStage::Interest => 1,
            ParentStage::Consideration => 2,
            ParentStage::Intent => 3,
            ParentStage::Evaluation => 4,
            ParentStage::Enrolled => 5,
        }
    }
}

impl Default for ParentStage {
    fn default() -> Self {
        ParentStage::Awareness
    }
}

impl std::fmt::Display for ParentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParentStage {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParentStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| StorageError::InvalidInput(format!("unknown parent stage '{}'", s)))
    }
}

/// Read-time risk classification; never stored
pub fn is_high_risk(risk_score: i32) -> bool {
    risk_score > HIGH_RISK_THRESHOLD
}

/// Impact of a status change on engagement
pub fn status_transition_impact(from: ParentStatus, to: ParentStatus) -> i32 {
    if to == ParentStatus::Lost {
        return -10;
    }
    match (from.rank(), to.rank()) {
        (Some(before), Some(after)) if after > before => 10,
        _ => 0,
    }
}

/// Impact of a stage change on engagement
pub fn stage_transition_impact(from: ParentStage, to: ParentStage) -> i32 {
    if to.rank() > from.rank() {
        5
    } else {
        0
    }
}

/// Apply a lifecycle delta to a score
///
/// Gains stop at SCORE_CEILING but never pull an imported score above the
/// ceiling back down; losses stop at zero.
pub fn adjust_score(score: i32, delta: i32) -> i32 {
    if delta >= 0 {
        score.saturating_add(delta).min(SCORE_CEILING.max(score))
    } else {
        score.saturating_add(delta).max(0)
    }
}

/// One funnel move detected while applying an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleTransition {
    pub event_type: &'static str,
    pub from: &'static str,
    pub to: &'static str,
    pub impact_score: i32,
}

impl LifecycleTransition {
    pub fn title(&self) -> String {
        match self.event_type {
            transition_types::STATUS_CHANGE => format!("Status changed to {}", self.to),
            _ => format!("Stage changed to {}", self.to),
        }
    }

    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "from": self.from,
            "to": self.to,
        })
    }
}

/// Work out which funnel moves an update performs; unchanged values yield none
pub fn detect_transitions(
    current_status: ParentStatus,
    current_stage: ParentStage,
    new_status: Option<ParentStatus>,
    new_stage: Option<ParentStage>,
) -> Vec<LifecycleTransition> {
    let mut transitions = Vec::new();

    if let Some(status) = new_status.filter(|s| *s != current_status) {
        transitions.push(LifecycleTransition {
            event_type: transition_types::STATUS_CHANGE,
            from: current_status.as_str(),
            to: status.as_str(),
            impact_score: status_transition_impact(current_status, status),
        });
    }

    if let Some(stage) = new_stage.filter(|s| *s != current_stage) {
        transitions.push(LifecycleTransition {
            event_type: transition_types::STAGE_CHANGE,
            from: current_stage.as_str(),
            to: stage.as_str(),
            impact_score: stage_transition_impact(current_stage, stage),
        });
    }

    transitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ParentStatus::ALL {
            assert_eq!(status.as_str().parse::<ParentStatus>().unwrap(), status);
        }
        assert!("prospect".parse::<ParentStatus>().is_err());
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ParentStatus::OfferMade).unwrap();
        assert_eq!(json, "\"offer_made\"");
        let stage: ParentStage = serde_json::from_str("\"consideration\"").unwrap();
        assert_eq!(stage, ParentStage::Consideration);
    }

    #[test]
    fn test_high_risk_is_strictly_above_threshold() {
        assert!(!is_high_risk(70));
        assert!(is_high_risk(71));
        assert!(!is_high_risk(0));
    }

    #[test]
    fn test_transition_impacts() {
        assert_eq!(status_transition_impact(ParentStatus::Lead, ParentStatus::Applicant), 10);
        assert_eq!(status_transition_impact(ParentStatus::Applicant, ParentStatus::Warm), 0);
        assert_eq!(status_transition_impact(ParentStatus::Warm, ParentStatus::Lost), -10);
        assert_eq!(status_transition_impact(ParentStatus::Enrolled, ParentStatus::Alumni), 0);
        assert_eq!(stage_transition_impact(ParentStage::Awareness, ParentStage::Intent), 5);
        assert_eq!(stage_transition_impact(ParentStage::Intent, ParentStage::Interest), 0);
    }

    #[test]
    fn test_adjust_score_clamps() {
        assert_eq!(adjust_score(95, 10), 100);
        assert_eq!(adjust_score(5, -10), 0);
        assert_eq!(adjust_score(40, 5), 45);
    }

    #[test]
    fn test_adjust_score_keeps_scores_above_ceiling() {
        assert_eq!(adjust_score(150, 10), 150);
        assert_eq!(adjust_score(150, 0), 150);
        assert_eq!(adjust_score(150, -10), 140);
        assert_eq!(adjust_score(100, 5), 100);
    }

    #[test]
    fn test_detect_transitions_ignores_unchanged_values() {
        let none = detect_transitions(
            ParentStatus::Lead,
            ParentStage::Awareness,
            Some(ParentStatus::Lead),
            None,
        );
        assert!(none.is_empty());

        let both = detect_transitions(
            ParentStatus::Lead,
            ParentStage::Awareness,
            Some(ParentStatus::Warm),
            Some(ParentStage::Interest),
        );
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].event_type, transition_types::STATUS_CHANGE);
        assert_eq!(both[0].to, "warm");
        assert_eq!(both[0].title(), "Status changed to warm");
        assert_eq!(both[1].event_type, transition_types::STAGE_CHANGE);
        assert_eq!(both[1].metadata()["from"], "awareness");
    }
}
