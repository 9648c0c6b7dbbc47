//! Derived completion statistics

use super::CurriculumEngine;
use crate::error::Result;
use crate::types::Progress;

impl CurriculumEngine {
    /// Completed/total unit counts and integer percentage. Computed on
    /// demand from the store, never cached or stored.
    pub async fn progress(&self, learner_id: i64) -> Result<Progress> {
        self.require_learner(learner_id).await?;
        let (completed, total) = self.store.unit_counts(learner_id).await?;
        let percent = if total == 0 {
            0
        } else {
            (100 * completed / total) as u32
        };
        Ok(Progress {
            completed,
            total,
            percent,
        })
    }
}
