//! Curriculum engine
//!
//! The single source of truth for the roadmap state machine. Hosts call the
//! operations exposed here (create learner, plan roadmap, next unit, grade
//! attempt, progress, reset); transport and presentation stay outside.
//!
//! Concurrency model: different learners are fully parallel. Within one
//! learner, every mutating sequence takes that learner's async lock around
//! its decide-and-write steps only, never across generator calls, which
//! take seconds. The session cache's per-unit lock independently guarantees
//! single-flight generation.

mod cache;
mod grading;
mod progress;
mod remediation;
mod roadmap;
mod scheduler;

pub use cache::SessionCache;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::generate::ContentGenerator;
use crate::store::RoadmapStore;
use crate::types::{Learner, LearnerProfile, MiniUnit, RoadmapNode, UnitSession};

/// Registry of keyed async locks
pub(crate) struct LockMap {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl LockMap {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Take the lock for a key, creating it on first use
    pub(crate) async fn acquire(&self, key: i64) -> OwnedMutexGuard<()> {
        let gate = {
            let mut map = self.inner.lock().await;
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        gate.lock_owned().await
    }

    /// Drop a key's lock entry when nobody holds or awaits it
    pub(crate) async fn release_if_idle(&self, key: i64) {
        let mut map = self.inner.lock().await;
        if let Some(gate) = map.get(&key) {
            if Arc::strong_count(gate) == 1 {
                map.remove(&key);
            }
        }
    }
}

/// The adaptive curriculum engine
pub struct CurriculumEngine {
    pub(crate) store: Arc<RoadmapStore>,
    pub(crate) generator: Arc<dyn ContentGenerator>,
    pub(crate) cache: SessionCache,
    pub(crate) pass_threshold: u32,
    pub(crate) learner_locks: LockMap,
}

impl CurriculumEngine {
    /// Build an engine over a store and a content generator
    pub fn new(
        store: Arc<RoadmapStore>,
        generator: Arc<dyn ContentGenerator>,
        config: &Config,
    ) -> Self {
        let cache = SessionCache::new(store.clone(), generator.clone(), config.quiz.clone());
        Self {
            store,
            generator,
            cache,
            pass_threshold: config.grading.pass_threshold,
            learner_locks: LockMap::new(),
        }
    }

    pub(crate) async fn require_learner(&self, learner_id: i64) -> Result<Learner> {
        self.store
            .learner(learner_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("learner {learner_id}")))
    }

    // ============ Learners ============

    /// Create a learner from a profile
    pub async fn add_learner(&self, profile: &LearnerProfile) -> Result<Learner> {
        if profile.name.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "learner name must not be empty".to_string(),
            ));
        }
        let learner = self.store.add_learner(profile).await?;
        info!(learner_id = learner.id, name = %learner.name, "created learner");
        Ok(learner)
    }

    /// List all learners
    pub async fn list_learners(&self) -> Result<Vec<Learner>> {
        self.store.list_learners().await
    }

    // ============ Read views ============

    /// The learner's full roadmap, ordered by position
    pub async fn roadmap(&self, learner_id: i64) -> Result<Vec<RoadmapNode>> {
        self.require_learner(learner_id).await?;
        self.store.roadmap(learner_id).await
    }

    /// All units for a learner
    pub async fn units(&self, learner_id: i64) -> Result<Vec<MiniUnit>> {
        self.require_learner(learner_id).await?;
        self.store.units_for_learner(learner_id).await
    }

    /// Revisit a unit: returns it with content attached, generating and
    /// caching the content first if it does not exist yet
    pub async fn unit_detail(&self, unit_id: i64) -> Result<UnitSession> {
        let unit = self
            .store
            .unit(unit_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("unit {unit_id}")))?;
        self.unit_session(unit).await
    }

    // ============ Lifecycle ============

    /// Whole-learner reset: removes the learner's nodes, units, content,
    /// and attempts. The profile itself survives.
    pub async fn reset(&self, learner_id: i64) -> Result<()> {
        self.require_learner(learner_id).await?;
        let _lock = self.learner_locks.acquire(learner_id).await;
        self.store.reset(learner_id).await?;
        info!(learner_id, "learner reset");
        Ok(())
    }
}
