//! services/api/src/adapters/mod.rs
//!
//! Concrete implementations of the core service ports: the Postgres report
//! store, the two text-generation backends, and the Gmail mail source.

pub mod anthropic_llm;
pub mod db;
pub mod gmail;
pub mod openai_llm;

use std::time::Duration;

use mail_report_core::ports::GenerationError;

/// How many times a generation call is attempted before the error is
/// surfaced to the pipeline.
pub(crate) const MAX_GENERATION_ATTEMPTS: usize = 3;

/// The shared retry policy for the generation adapters.
///
/// Returns the delay before the next attempt, or `None` when the error is
/// not worth retrying (auth failures, malformed requests). `attempt` is
/// zero-based.
pub(crate) fn retry_delay(error: &GenerationError, attempt: usize) -> Option<Duration> {
    match error {
        GenerationError::RateLimited(_) => Some(Duration::from_secs(((attempt + 1) * 10) as u64)),
        GenerationError::Timeout(_) => Some(Duration::from_secs(5)),
        GenerationError::Server(_) => Some(Duration::from_secs(((attempt + 1) * 5) as u64)),
        GenerationError::Auth(_) | GenerationError::Other(_) => None,
    }
}
