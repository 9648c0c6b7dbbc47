//! Remediation planning
//!
//! Decomposes a failed node's subtopic into simplified children, inserts
//! them directly after the parent (shifting everything later), and
//! pre-generates lesson + quiz for each new unit. Pre-generating at split
//! time costs extra generator calls now but makes the learner's next
//! "what's next" request instant.

use tracing::info;

use super::CurriculumEngine;
use crate::error::Result;
use crate::generate::tasks;
use crate::types::{RoadmapNode, SplitOutcome};

impl CurriculumEngine {
    /// Split a failed node into remediation children. The decomposition
    /// call runs outside the learner lock; only the tree mutation holds it.
    pub(crate) async fn remediate(&self, node: &RoadmapNode) -> Result<SplitOutcome> {
        let children = tasks::decompose_topic(self.generator.as_ref(), &node.subtopic).await;

        let created = {
            let _lock = self.learner_locks.acquire(node.learner_id).await;
            self.store
                .append_children_with_units(node.id, &children)
                .await?
        };
        info!(
            node_id = node.id,
            children = created.len(),
            "split node into remediation children"
        );

        // Eager generation; the per-unit single-flight lock still guards
        // against a concurrent selection generating the same unit
        for (_, unit) in &created {
            self.cache.ensure_content(unit.id).await?;
        }

        let roadmap = self.store.roadmap(node.learner_id).await?;
        Ok(SplitOutcome {
            node_ids: created.iter().map(|(n, _)| n.id).collect(),
            unit_ids: created.iter().map(|(_, u)| u.id).collect(),
            roadmap,
        })
    }
}
