//! crates/mail_report_core/src/pipeline.rs
//!
//! The report pipeline: fetch → aggregate → score → batch → generate
//! (coverage-checked) → assemble → persist. Fully sequential per run; the
//! only blocking operations are the provider round trips.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::assemble::{assemble, empty_report, fallback_report};
use crate::batching::plan;
use crate::coverage::generate_batch_report;
use crate::domain::{MessageReference, RunOutcome, ScoredThread, SummaryDocument};
use crate::importance::{ImportanceScorer, ScoringRules};
use crate::ports::{
    FetchWindow, GenerationError, MailSource, MailSourceError, PortError, ReportStore,
    TextGeneration,
};
use crate::threading::aggregate;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum threads per provider call; 0 means a single batch.
    pub max_threads_per_batch: usize,
    /// Cap on the number of scored threads whose messages are persisted as
    /// references; `None` means no cap.
    pub max_reference_threads: Option<usize>,
    /// Maximum messages to pull from the mail source per run.
    pub max_fetch_results: usize,
    /// Timeout handed to every provider call.
    pub provider_timeout: Duration,
    /// Prefix for per-message deep links (message id is appended).
    pub deep_link_base: String,
    /// Heuristic weight tables for the importance scorer.
    pub rules: ScoringRules,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_threads_per_batch: 50,
            max_reference_threads: Some(20),
            max_fetch_results: 100,
            provider_timeout: Duration::from_secs(60),
            deep_link_base: "https://mail.google.com/mail/u/0/#inbox/".to_string(),
            rules: ScoringRules::default(),
        }
    }
}

/// Errors that surface to the caller of a run.
///
/// Everything else (provider generation failure, coverage gaps, malformed
/// provider output) degrades gracefully and the run still persists a report.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Authentication failure from a collaborator; never downgraded.
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("mail fetch failed: {0}")]
    Mail(String),
    #[error("report persistence failed: {0}")]
    Store(#[from] PortError),
}

/// Wires the three ports together for report runs.
pub struct ReportPipeline {
    mail: Arc<dyn MailSource>,
    provider: Arc<dyn TextGeneration>,
    store: Arc<dyn ReportStore>,
    config: PipelineConfig,
}

impl ReportPipeline {
    pub fn new(
        mail: Arc<dyn MailSource>,
        provider: Arc<dyn TextGeneration>,
        store: Arc<dyn ReportStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            mail,
            provider,
            store,
            config,
        }
    }

    /// Generates and persists the report for `report_date`.
    ///
    /// When `last_n_hours` is given, the fetch window is the trailing N
    /// hours instead of the calendar date; the report is still keyed by
    /// `report_date`.
    pub async fn generate_for_date(
        &self,
        report_date: NaiveDate,
        last_n_hours: Option<u32>,
    ) -> Result<RunOutcome, PipelineError> {
        info!(%report_date, "starting report run");

        let window = match last_n_hours {
            Some(hours) => FetchWindow::LastHours(hours),
            None => FetchWindow::Dates {
                from: report_date,
                to: report_date,
            },
        };

        let messages = self
            .mail
            .fetch(window, self.config.max_fetch_results)
            .await
            .map_err(|e| match e {
                MailSourceError::Auth(msg) => PipelineError::Auth(msg),
                MailSourceError::Other(msg) => PipelineError::Mail(msg),
            })?;
        info!(count = messages.len(), "fetched messages");

        if messages.is_empty() {
            info!("no mail for the window, persisting the minimal report");
            let summary = empty_report();
            let report_id = self.store.save(report_date, &summary, &[]).await?;
            return Ok(RunOutcome {
                report_id,
                date: report_date,
                summary,
                email_count: 0,
                thread_count: 0,
                reference_count: 0,
            });
        }

        let threads = aggregate(&messages);
        let scorer = ImportanceScorer::new(self.config.rules.clone());
        let scored = scorer.prioritize(threads);
        info!(
            threads = scored.len(),
            top_score = scored.first().map(|s| s.score).unwrap_or(0.0),
            "threads scored"
        );

        let summary = match self.run_generation(&scored, report_date).await {
            Ok(summary) => summary,
            Err(GenerationError::Auth(msg)) => return Err(PipelineError::Auth(msg)),
            Err(e) => {
                warn!(error = %e, "provider generation failed, using the local fallback report");
                fallback_report(&scored)
            }
        };

        let references = self.build_references(&scored);
        let report_id = self.store.save(report_date, &summary, &references).await?;
        info!(%report_id, references = references.len(), "report persisted");

        Ok(RunOutcome {
            report_id,
            date: report_date,
            summary,
            email_count: messages.len(),
            thread_count: scored.len(),
            reference_count: references.len(),
        })
    }

    /// The generation phase as one explicit outcome: batched coverage-checked
    /// calls followed by the finalize synthesis. Any provider error makes the
    /// whole phase fail so the caller can choose the fallback branch.
    async fn run_generation(
        &self,
        scored: &[ScoredThread],
        report_date: NaiveDate,
    ) -> Result<SummaryDocument, GenerationError> {
        let batches = plan(scored, self.config.max_threads_per_batch);
        info!(batches = batches.len(), "planned provider batches");

        let mut batch_reports = Vec::with_capacity(batches.len());
        for batch in &batches {
            let report = generate_batch_report(
                self.provider.as_ref(),
                batch,
                report_date,
                self.config.provider_timeout,
            )
            .await?;
            batch_reports.push(report);
        }

        assemble(
            self.provider.as_ref(),
            &batch_reports,
            report_date,
            self.config.provider_timeout,
        )
        .await
    }

    /// Per-message pointers for the top scored threads, persisted alongside
    /// the report for quick display and deep-linking.
    fn build_references(&self, scored: &[ScoredThread]) -> Vec<MessageReference> {
        let cap = self.config.max_reference_threads.unwrap_or(scored.len());
        scored
            .iter()
            .take(cap)
            .flat_map(|entry| entry.thread.messages.iter())
            .map(|message| MessageReference {
                message_id: message.id.clone(),
                thread_id: message.thread_id.clone(),
                subject: message.subject.clone(),
                from_addr: message.from_addr.clone(),
                to_addr: message.to_addr.clone(),
                timestamp: message.timestamp,
                snippet: message.snippet.clone(),
                deep_link: format!("{}{}", self.config.deep_link_base, message.id),
            })
            .collect()
    }
}
