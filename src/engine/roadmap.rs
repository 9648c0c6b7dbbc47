//! Roadmap planning
//!
//! Chooses the learner's next study topic from their profile, asks the
//! planner for an outline, and replaces the learner's unfinished roadmap
//! with the new batch. Completed nodes are kept; only not-done work is
//! cleared before inserting.

use tracing::info;

use super::CurriculumEngine;
use crate::error::Result;
use crate::generate::tasks;
use crate::types::{NodeSpec, RoadmapPlan};

impl CurriculumEngine {
    /// Generate a fresh roadmap for a learner.
    ///
    /// Topic choice and outline generation run outside the learner lock;
    /// clearing the old unfinished nodes and inserting the new batch are
    /// one locked write phase.
    pub async fn plan_roadmap(&self, learner_id: i64) -> Result<RoadmapPlan> {
        let learner = self.require_learner(learner_id).await?;

        let current = self.store.current_topic(learner_id).await?;
        let topic =
            tasks::choose_topic(self.generator.as_ref(), &learner, current.as_deref()).await;
        let outline = tasks::build_outline(self.generator.as_ref(), &topic).await;
        let specs: Vec<NodeSpec> = outline
            .into_iter()
            .map(|item| NodeSpec {
                subtopic: item.subtopic,
                resources: item.resources,
            })
            .collect();

        let nodes = {
            let _lock = self.learner_locks.acquire(learner_id).await;
            self.store.clear_unfinished(learner_id).await?;
            let nodes = self
                .store
                .create_top_level_batch(learner_id, &topic, &specs)
                .await?;
            self.store.set_current_topic(learner_id, &topic).await?;
            nodes
        };

        info!(learner_id, topic = %topic, subtopics = nodes.len(), "planned roadmap");
        Ok(RoadmapPlan { topic, nodes })
    }
}
