//! crates/mail_report_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the report pipeline's external
//! collaborators. These traits form the boundary of the hexagonal
//! architecture, allowing the core to be independent of the concrete mail
//! provider, text-generation backend, and database.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{MessageReference, NormalizedMessage, StoredReport, SummaryDocument};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for store operations.
/// This abstracts away the specific errors from the underlying database.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Errors raised by a text-generation backend.
///
/// The taxonomy is what the adapter-level retry policy reacts to; the core
/// only consumes the final outcome. `Auth` is fatal to a run and is never
/// downgraded to the local fallback report.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider authentication failed: {0}")]
    Auth(String),
    #[error("provider rate limited: {0}")]
    RateLimited(String),
    #[error("provider request timed out: {0}")]
    Timeout(String),
    #[error("provider server error: {0}")]
    Server(String),
    #[error("provider call failed: {0}")]
    Other(String),
}

/// Errors raised by a mail source.
#[derive(Debug, thiserror::Error)]
pub enum MailSourceError {
    #[error("mail source authentication failed: {0}")]
    Auth(String),
    #[error("mail source request failed: {0}")]
    Other(String),
}

//=========================================================================================
// Provider Response
//=========================================================================================

/// A normalized text-generation reply.
///
/// `Structured` carries the legacy JSON-object encoding some providers emit;
/// `FreeText` is the Markdown encoding the prompt contract asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResponse {
    Structured(serde_json::Value),
    FreeText(String),
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A text-generation backend.
///
/// One implementation exists per backend, selected once at configuration
/// time; the pipeline never branches on provider names. Transient-failure
/// retries (rate limit, timeout, server error) are the implementation's
/// responsibility.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate(
        &self,
        system_text: &str,
        user_text: &str,
        timeout: std::time::Duration,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// The window of mail a source should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// Calendar-date range, both ends inclusive.
    Dates { from: NaiveDate, to: NaiveDate },
    /// Everything received in the last N hours.
    LastHours(u32),
}

/// A provider of normalized email messages.
///
/// Pagination and provider rate-limit handling belong to the implementation.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch(
        &self,
        window: FetchWindow,
        max_results: usize,
    ) -> Result<Vec<NormalizedMessage>, MailSourceError>;
}

/// Persistence for generated reports, keyed by calendar date.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Upsert by date: a second save for the same date replaces the prior
    /// summary and reference list.
    async fn save(
        &self,
        date: NaiveDate,
        summary: &SummaryDocument,
        references: &[MessageReference],
    ) -> PortResult<Uuid>;

    async fn get_by_id(&self, id: Uuid) -> PortResult<StoredReport>;

    async fn get_by_date(&self, date: NaiveDate) -> PortResult<StoredReport>;

    /// List reports within an optional date range, newest first.
    async fn list(
        &self,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> PortResult<Vec<StoredReport>>;

    /// Delete a report and its references. Returns false when it didn't exist.
    async fn delete(&self, id: Uuid) -> PortResult<bool>;
}
