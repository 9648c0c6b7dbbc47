//! Core entity types for the adaptive curriculum
//!
//! Every persisted entity gets an explicit record type; optional columns are
//! `Option<T>`, never implied by key absence. Status enums round-trip through
//! the TEXT form stored in SQLite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EngineError;

/// Default time estimate attached to a freshly created unit, in minutes.
pub const DEFAULT_UNIT_MINUTES: i64 = 50;

// ============ Status enums ============

/// Status of a roadmap node.
///
/// `Done` and `Split` are terminal for direct work on the node. A `Split`
/// node only becomes `Done` through bubble-up, once every child under it
/// has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Done,
    Split,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Done => "done",
            NodeStatus::Split => "split",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NodeStatus::Pending),
            "done" => Some(NodeStatus::Done),
            "split" => Some(NodeStatus::Split),
            _ => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a mini unit. There is deliberately no "failed" variant: a
/// failing attempt marks the owning node `Split` and the unit stays
/// `Pending`, with all further work routed through the new children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Pending,
    Done,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(UnitStatus::Pending),
            "done" => Some(UnitStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============ Persisted entities ============

/// A learner and the profile fields that drive topic selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
    pub id: i64,
    pub name: String,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub interests: Option<String>,
    pub course: Option<String>,
    pub year: Option<String>,
}

/// Input profile for creating a learner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub name: String,
    pub strengths: Option<String>,
    pub weaknesses: Option<String>,
    pub interests: Option<String>,
    pub course: Option<String>,
    pub year: Option<String>,
}

/// One topic/subtopic entry in a learner's ordered curriculum tree.
///
/// Nodes form a forest per learner: top-level nodes have `parent_id = None`,
/// remediation children point at the node they were split from. Sibling
/// `position` values are unique and strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapNode {
    pub id: i64,
    pub learner_id: i64,
    pub topic: String,
    pub subtopic: String,
    pub position: i64,
    pub status: NodeStatus,
    pub parent_id: Option<i64>,
    pub resources: Vec<String>,
}

/// One concrete, assignable piece of work (lesson + quiz) under a node.
/// Created lazily, one per node until that node resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniUnit {
    pub id: i64,
    pub node_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub estimated_minutes: i64,
    pub status: UnitStatus,
    /// Set at most once, when content is generated and cached.
    pub content_ref: Option<i64>,
}

/// A single multiple-choice quiz question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub rationale: String,
}

/// Cached lesson text and quiz for a unit. Immutable once created;
/// regeneration never silently replaces an existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub id: i64,
    pub unit_id: i64,
    pub lesson_text: String,
    pub resources: Vec<String>,
    pub videos: Vec<String>,
    pub quiz: Vec<QuizItem>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of one submitted answer. Never updated or deleted
/// except on whole-learner reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub learner_id: i64,
    pub unit_id: i64,
    pub question: String,
    pub submitted_answer: Option<String>,
    pub is_correct: bool,
    pub difficulty: String,
    pub created_at: DateTime<Utc>,
}

// ============ Operation inputs ============

/// A top-level node to insert when building a roadmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub subtopic: String,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// A simplified child topic produced by decomposing a failed node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildTopic {
    pub title: String,
    pub description: String,
}

/// Submitted quiz answers, keyed by question index.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizSubmission {
    #[serde(default)]
    pub answers: BTreeMap<usize, String>,
}

impl QuizSubmission {
    /// Parse a submission from raw JSON. Accepts either a bare
    /// `{"0": "answer", ...}` map or the wrapped `{"answers": {...}}` form.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        if let Ok(answers) = serde_json::from_str::<BTreeMap<usize, String>>(raw) {
            return Ok(Self { answers });
        }
        serde_json::from_str::<Self>(raw)
            .map_err(|e| EngineError::InvalidInput(format!("malformed answers payload: {e}")))
    }
}

// ============ Operation outputs ============

/// A unit handed to the learner, with its owning node's subtopic and the
/// generated content attached.
#[derive(Debug, Clone, Serialize)]
pub struct UnitSession {
    pub unit: MiniUnit,
    pub subtopic: String,
    pub content: GeneratedContent,
}

/// Result of asking for the next piece of work. `Complete` is a terminal
/// sentinel, not an error.
#[derive(Debug, Clone, Serialize)]
pub enum NextUnit {
    Unit(UnitSession),
    Complete,
}

/// Per-question outcome of a graded attempt.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question: String,
    pub submitted: Option<String>,
    pub correct_answer: String,
    pub difficulty: String,
    pub is_correct: bool,
}

/// Nodes and units created by splitting a failed node, plus the learner's
/// re-ordered roadmap for display.
#[derive(Debug, Clone, Serialize)]
pub struct SplitOutcome {
    pub node_ids: Vec<i64>,
    pub unit_ids: Vec<i64>,
    pub roadmap: Vec<RoadmapNode>,
}

/// Outcome of grading one submitted attempt.
#[derive(Debug, Clone, Serialize)]
pub struct GradeReport {
    pub unit_id: i64,
    pub score_pct: u32,
    pub passed: bool,
    pub results: Vec<QuestionResult>,
    /// Present only when the attempt failed and the node was split.
    pub remediation: Option<SplitOutcome>,
}

/// Freshly planned roadmap: the chosen topic and the inserted nodes.
#[derive(Debug, Clone, Serialize)]
pub struct RoadmapPlan {
    pub topic: String,
    pub nodes: Vec<RoadmapNode>,
}

/// Derived completion statistics, computed on demand and never stored.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub percent: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_round_trip() {
        for status in [NodeStatus::Pending, NodeStatus::Done, NodeStatus::Split] {
            assert_eq!(NodeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(NodeStatus::parse("failed"), None);
    }

    #[test]
    fn test_unit_status_round_trip() {
        for status in [UnitStatus::Pending, UnitStatus::Done] {
            assert_eq!(UnitStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UnitStatus::parse("split"), None);
    }

    #[test]
    fn test_submission_bare_map() {
        let sub = QuizSubmission::from_json(r#"{"0": "a", "3": "b"}"#).unwrap();
        assert_eq!(sub.answers.get(&0).map(String::as_str), Some("a"));
        assert_eq!(sub.answers.get(&3).map(String::as_str), Some("b"));
        assert_eq!(sub.answers.len(), 2);
    }

    #[test]
    fn test_submission_wrapped() {
        let sub = QuizSubmission::from_json(r#"{"answers": {"1": "x"}}"#).unwrap();
        assert_eq!(sub.answers.get(&1).map(String::as_str), Some("x"));
    }

    #[test]
    fn test_submission_malformed() {
        assert!(QuizSubmission::from_json("not json").is_err());
        assert!(QuizSubmission::from_json(r#"{"answers": [1, 2]}"#).is_err());
    }

    #[test]
    fn test_quiz_item_tolerates_missing_fields() {
        let item: QuizItem = serde_json::from_str(r#"{"question": "Q?"}"#).unwrap();
        assert_eq!(item.question, "Q?");
        assert!(item.options.is_empty());
        assert!(item.correct_answer.is_empty());
    }
}
