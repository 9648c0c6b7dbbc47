//! Next-unit selection
//!
//! Fixed priority policy, first match wins:
//! 1. pending units under remediation children (finish the remediation
//!    branch before resuming the main sequence)
//! 2. pending top-level units
//! 3. no units at all: lazily create the first unit under the earliest
//!    pending top-level node and re-evaluate, bounded to ONE retry
//! 4. nothing pending: the curriculum is complete (a sentinel, not an error)

use tracing::{debug, info};

use super::CurriculumEngine;
use crate::error::{EngineError, Result};
use crate::types::{MiniUnit, NextUnit, UnitSession};

impl CurriculumEngine {
    /// Pick the learner's next unit of work, generating its content if it
    /// has none cached yet
    pub async fn next_unit(&self, learner_id: i64) -> Result<NextUnit> {
        self.require_learner(learner_id).await?;

        let selected = {
            let _lock = self.learner_locks.acquire(learner_id).await;
            let mut selected = None;
            // Explicit bounded loop: at most one re-evaluation after
            // auto-creating a unit
            for _ in 0..2 {
                if let Some(unit) = self.store.next_pending_child_unit(learner_id).await? {
                    selected = Some(unit);
                    break;
                }
                if let Some(unit) = self.store.next_pending_top_unit(learner_id).await? {
                    selected = Some(unit);
                    break;
                }
                let Some(node) = self.store.first_unstarted_top_node(learner_id).await? else {
                    break;
                };
                let title = format!("{} - Part 1", node.subtopic);
                debug!(node_id = node.id, title = %title, "auto-creating first unit for node");
                self.store.create_unit(node.id, &title, None).await?;
            }
            selected
        };

        let Some(unit) = selected else {
            info!(learner_id, "curriculum complete");
            return Ok(NextUnit::Complete);
        };

        let session = self.unit_session(unit).await?;
        Ok(NextUnit::Unit(session))
    }

    /// Attach generated content and the owning node's subtopic to a unit.
    /// Shared by selection and the revisit view.
    pub(crate) async fn unit_session(&self, unit: MiniUnit) -> Result<UnitSession> {
        let content = self.cache.ensure_content(unit.id).await?;
        let node = self.store.node(unit.node_id).await?.ok_or_else(|| {
            EngineError::Consistency(format!(
                "unit {} references missing node {}",
                unit.id, unit.node_id
            ))
        })?;
        // Re-read the unit so content_ref reflects the cache write
        let unit = self
            .store
            .unit(unit.id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("unit {}", unit.id)))?;
        Ok(UnitSession {
            unit,
            subtopic: node.subtopic,
            content,
        })
    }
}
