//! crates/mail_report_core/src/domain.rs
//!
//! Defines the pure, core data structures for the report pipeline.
//! These structs are independent of any database or transport format;
//! only the persisted document shapes derive serde traits.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single email message after source-specific normalization.
///
/// Produced once per raw input message and never mutated afterward.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: Option<String>,
    pub from_addr: Option<String>,
    pub to_addr: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub body_plain: String,
    pub snippet: String,
    pub labels: Vec<String>,
    pub cc_addrs: Vec<String>,
    pub has_attachments: bool,
    pub attachment_names: Vec<String>,
    pub sender_name: Option<String>,
    pub sender_domain: Option<String>,
}

/// A conversation: every message sharing a thread id, merged into one
/// size-capped combined-text unit for summarization.
///
/// Invariant: `messages` is sorted ascending by timestamp, messages without
/// a timestamp first.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub thread_id: String,
    /// Subject of the earliest message in the thread.
    pub subject: String,
    pub messages: Vec<NormalizedMessage>,
    /// Rendered text of the whole thread, capped at the aggregator's limit.
    pub combined_text: String,
    /// Set when the combined text hit the cap and content was dropped.
    pub is_truncated: bool,
    /// Union of from/to/cc addresses across all messages.
    pub participants: Vec<String>,
    pub sender_domains: BTreeSet<String>,
    pub has_attachments: bool,
    pub message_count: usize,
    /// Latest timestamp across the thread; `None` when no message is dated.
    pub latest_timestamp: Option<DateTime<Utc>>,
}

/// A thread together with its heuristic importance score (0-100).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredThread {
    pub thread: Thread,
    pub score: f64,
}

/// A lightweight per-message pointer persisted alongside a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: String,
    pub thread_id: String,
    pub subject: Option<String>,
    pub from_addr: Option<String>,
    pub to_addr: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub snippet: String,
    pub deep_link: String,
}

/// The persisted summary document: the full Markdown report plus the flat
/// highlight/todo lists and the per-section bodies used for quick display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    /// Always `"markdown"` for documents produced by this pipeline.
    pub format: String,
    pub full_content: String,
    pub highlights: Vec<String>,
    pub todos: Vec<String>,
    pub sections: BTreeMap<String, String>,
}

impl SummaryDocument {
    pub fn markdown(full_content: String) -> Self {
        Self {
            format: "markdown".to_string(),
            full_content,
            highlights: Vec::new(),
            todos: Vec::new(),
            sections: BTreeMap::new(),
        }
    }
}

/// A report as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: Uuid,
    pub date: NaiveDate,
    pub summary: SummaryDocument,
    pub references: Vec<MessageReference>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredReport {
    /// Number of referenced messages.
    pub fn email_count(&self) -> usize {
        self.references.len()
    }

    /// Number of distinct referenced threads.
    pub fn thread_count(&self) -> usize {
        self.references
            .iter()
            .map(|r| r.thread_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// The outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub report_id: Uuid,
    pub date: NaiveDate,
    pub summary: SummaryDocument,
    pub email_count: usize,
    pub thread_count: usize,
    pub reference_count: usize,
}
