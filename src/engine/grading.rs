//! Attempt grading and status transitions
//!
//! Scores a submitted attempt against the unit's cached quiz, appends one
//! attempt record per question regardless of outcome, then drives the node
//! state machine: PASS marks the unit and node done and bubbles completion
//! upward; FAIL marks the node split and hands over to remediation. The
//! failed unit itself stays pending; it is never retried directly.

use tracing::info;

use super::CurriculumEngine;
use crate::error::{EngineError, Result};
use crate::types::{GradeReport, QuestionResult, QuizSubmission};

/// Answer comparison: whitespace-insensitive, case-insensitive
fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

impl CurriculumEngine {
    /// Grade a submitted attempt for a unit
    pub async fn grade_attempt(
        &self,
        unit_id: i64,
        submission: &QuizSubmission,
    ) -> Result<GradeReport> {
        let unit = self
            .store
            .unit(unit_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("unit {unit_id}")))?;
        let node = self.store.node(unit.node_id).await?.ok_or_else(|| {
            EngineError::Consistency(format!(
                "unit {unit_id} references missing node {}",
                unit.node_id
            ))
        })?;
        let content = self
            .store
            .content_for_unit(unit_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("no generated content for unit {unit_id}")))?;

        let mut results = Vec::with_capacity(content.quiz.len());
        let mut correct = 0usize;
        for (i, item) in content.quiz.iter().enumerate() {
            let submitted = submission.answers.get(&i).cloned();
            let is_correct = submitted
                .as_deref()
                .map(|answer| normalize(answer) == normalize(&item.correct_answer))
                .unwrap_or(false);
            if is_correct {
                correct += 1;
            }
            results.push(QuestionResult {
                question: item.question.clone(),
                submitted,
                correct_answer: item.correct_answer.clone(),
                difficulty: item.difficulty.clone(),
                is_correct,
            });
        }

        let total = content.quiz.len();
        let score_pct = if total == 0 {
            0
        } else {
            (100.0 * correct as f64 / total as f64).round() as u32
        };
        let passed = score_pct >= self.pass_threshold;

        // Decide-and-write under the learner lock; the guard is dropped
        // before remediation, which re-acquires it around its own writes
        {
            let _lock = self.learner_locks.acquire(node.learner_id).await;
            if passed {
                self.store
                    .apply_pass(node.learner_id, unit_id, node.id, &results)
                    .await?;
            } else {
                self.store
                    .apply_fail(node.learner_id, unit_id, node.id, &results)
                    .await?;
            }
        }

        info!(unit_id, score_pct, passed, "graded attempt");

        let remediation = if passed {
            None
        } else {
            Some(self.remediate(&node).await?)
        };

        Ok(GradeReport {
            unit_id,
            score_pct,
            passed,
            results,
            remediation,
        })
    }
}
