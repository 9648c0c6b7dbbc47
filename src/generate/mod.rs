//! Lesson and quiz generation
//!
//! Provides:
//! - The [`ContentGenerator`] trait the engine consumes (narrow seam; tests
//!   substitute a scripted implementation)
//! - An OpenAI-compatible client implementation ([`llm::LlmGenerator`])
//! - Domain-level generation tasks with deterministic fallbacks
//!   ([`tasks`]): lesson text, quizzes, topic choice, outlines, splits,
//!   resource/video links
//!
//! Generation failures never escape this layer as hard errors at the task
//! level: every task substitutes a deterministic fallback, because a
//! flaky generator must never break the learner-facing flow.

pub mod llm;
pub mod tasks;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use llm::LlmGenerator;

/// Which configured model a generation call should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenRole {
    /// Long-form lesson/study-guide text
    Study,
    /// Quiz construction
    Quiz,
    /// Planning: topic choice, outlines, splits, link lists
    Planner,
}

/// Failures internal to the generation layer. Absorbed by task-level
/// fallbacks; never crosses the engine API.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("empty completion")]
    Empty,

    #[error("malformed structured output: {0}")]
    Malformed(String),
}

/// External collaborator that produces lesson text and structured values.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate free-form text for a prompt.
    async fn generate_text(
        &self,
        role: GenRole,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;

    /// Generate a JSON value following the given schema hint. The result
    /// may still mismatch the schema; callers validate and fall back.
    async fn generate_structured(
        &self,
        role: GenRole,
        prompt: &str,
        schema: &str,
    ) -> Result<Value, GenerationError>;
}
