//! Persistent roadmap storage
//!
//! Provides:
//! - SQLite-based persistence for learners, nodes, units, content, attempts
//! - Transactional position maintenance (batch append, child insertion)
//! - The selection query primitives used by the scheduler
//! - Whole-learner cascading reset
//!
//! All multi-row mutations run inside a single transaction so a failure
//! partway never leaves a partially shifted sequence. Tests substitute an
//! in-memory database via [`RoadmapStore::open_in_memory`].

pub mod sqlite;

pub use sqlite::RoadmapStore;
