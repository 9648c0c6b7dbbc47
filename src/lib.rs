//! Smart Curriculum - Adaptive Learning Roadmap Engine
//!
//! Manages a per-learner adaptive curriculum:
//! - Hierarchical roadmap of topics, planned from the learner's profile
//! - Lazily generated lesson units (study guide + quiz) with an idempotent,
//!   single-flight generation cache
//! - Quiz grading with automatic remediation: a failed topic is split into
//!   simpler sub-topics inserted into the learner's sequence
//! - Derived progress tracking
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use smart_curriculum::config::Config;
//! use smart_curriculum::engine::CurriculumEngine;
//! use smart_curriculum::generate::LlmGenerator;
//! use smart_curriculum::store::RoadmapStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(RoadmapStore::open(&config.storage.database_path).await?);
//!     let generator = Arc::new(LlmGenerator::from_config(&config)?);
//!     let engine = CurriculumEngine::new(store, generator, &config);
//!
//!     let next = engine.next_unit(1).await?;
//!     println!("{next:?}");
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod types;
pub mod config;
pub mod store; // Must come before engine since engine depends on store
pub mod generate;
pub mod engine;
pub mod cli;

// Re-export commonly used types for convenience
pub use config::Config;
pub use engine::CurriculumEngine;
pub use error::EngineError;
pub use generate::{ContentGenerator, GenRole, GenerationError, LlmGenerator};
pub use store::RoadmapStore;
pub use types::{
    GradeReport, Learner, LearnerProfile, MiniUnit, NextUnit, NodeStatus, Progress, QuizSubmission,
    RoadmapNode, UnitStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
