//! Idempotent, single-flight content generation and caching
//!
//! Sits between the scheduler/remediation paths and the external
//! generators. A unit's content is generated at most once: the cached row
//! is returned with zero generator calls, and concurrent requests for the
//! same unit coalesce onto one generation.

use std::sync::Arc;
use tracing::{debug, info};

use super::LockMap;
use crate::config::QuizConfig;
use crate::error::{EngineError, Result};
use crate::generate::{tasks, ContentGenerator};
use crate::store::RoadmapStore;
use crate::types::GeneratedContent;

/// Generate-and-cache layer over the content/quiz generators
pub struct SessionCache {
    store: Arc<RoadmapStore>,
    generator: Arc<dyn ContentGenerator>,
    quiz: QuizConfig,
    inflight: LockMap,
}

impl SessionCache {
    pub fn new(
        store: Arc<RoadmapStore>,
        generator: Arc<dyn ContentGenerator>,
        quiz: QuizConfig,
    ) -> Self {
        Self {
            store,
            generator,
            quiz,
            inflight: LockMap::new(),
        }
    }

    /// Return the unit's content, generating and caching it on first use.
    ///
    /// Concurrent calls for the same unit perform exactly one generation;
    /// later callers wait for the first and receive the identical row.
    /// Generator failures are absorbed by the task-level fallbacks, so the
    /// only errors out of here are storage and lookup failures.
    pub async fn ensure_content(&self, unit_id: i64) -> Result<GeneratedContent> {
        // Fast path: cached content, no locking, no generator calls
        if let Some(existing) = self.store.content_for_unit(unit_id).await? {
            return Ok(existing);
        }

        let result = self.ensure_locked(unit_id).await;
        self.inflight.release_if_idle(unit_id).await;
        result
    }

    async fn ensure_locked(&self, unit_id: i64) -> Result<GeneratedContent> {
        let _gate = self.inflight.acquire(unit_id).await;

        // Re-check: the first caller may have generated while we waited
        if let Some(existing) = self.store.content_for_unit(unit_id).await? {
            debug!(unit_id, "content generated while waiting, reusing");
            return Ok(existing);
        }

        self.generate_and_store(unit_id).await
    }

    async fn generate_and_store(&self, unit_id: i64) -> Result<GeneratedContent> {
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

        // Remediation children get the shorter, simplified treatment
        let remedial = node.parent_id.is_some();
        let question_count = if remedial {
            self.quiz.remediation_questions
        } else {
            self.quiz.unit_questions
        };

        let gen = self.generator.as_ref();
        let lesson = tasks::lesson_text(gen, &unit.title, remedial).await;
        let quiz = tasks::build_quiz(gen, &lesson, question_count).await;
        let resources = tasks::article_links(gen, &unit.title).await;
        let videos = tasks::video_links(gen, &unit.title).await;

        info!(unit_id, questions = quiz.len(), "generated and cached unit content");
        self.store
            .insert_content(unit_id, &lesson, &resources, &videos, &quiz)
            .await
    }
}
