//! crates/mail_report_core/src/assemble.rs
//!
//! Report assembly: concatenates per-batch sections, runs the finalize
//! provider call for the cross-batch highlights / action items, and rebuilds
//! the fixed four-section document. Also provides the no-mail report and the
//! fully local fallback used when the provider is unusable.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;

use crate::coverage::BatchReport;
use crate::domain::{ScoredThread, SummaryDocument};
use crate::importance::{priority_label, IMPORTANT_THRESHOLD};
use crate::markdown::{
    is_highlights_title, is_todos_title, parse_markdown, SECTION_ACTION_ITEMS, SECTION_HIGHLIGHTS,
    SECTION_IMPORTANT, SECTION_NON_IMPORTANT,
};
use crate::ports::{GenerationError, TextGeneration};
use crate::prompts::compose_finalize;

/// Builds the final four-section document from the per-batch reports,
/// issuing one finalize call against the concatenated material.
///
/// Tags inside the concatenated sections stay batch-scoped and are ambiguous
/// across batches; global coverage cannot be re-validated here.
pub async fn assemble(
    provider: &dyn TextGeneration,
    batch_reports: &[BatchReport],
    report_date: NaiveDate,
    timeout: Duration,
) -> Result<SummaryDocument, GenerationError> {
    let important = join_bodies(batch_reports.iter().map(|r| r.important_body()));
    let non_important = join_bodies(batch_reports.iter().map(|r| r.non_important_body()));

    let prompt = compose_finalize(&important, &non_important, report_date);
    let response = provider.generate(&prompt.system, &prompt.user, timeout).await?;
    let finalize_doc = crate::markdown::parse_reply(&response);

    // A reply without recognizable headings still carries content through
    // the parser's flat lists; fall back to those instead of dropping it.
    let highlights_body = finalize_doc
        .section_body(is_highlights_title)
        .map(str::to_string)
        .unwrap_or_else(|| bullet_list(&finalize_doc.highlights));
    let action_items_body = finalize_doc
        .section_body(is_todos_title)
        .map(str::to_string)
        .unwrap_or_else(|| bullet_list(&finalize_doc.todos));

    info!(batches = batch_reports.len(), "assembled final report");

    Ok(document_from_markdown(render_document(
        &important,
        &non_important,
        &highlights_body,
        &action_items_body,
        None,
    )))
}

/// The fixed minimal report for a day without any mail. No provider call is
/// involved.
pub fn empty_report() -> SummaryDocument {
    document_from_markdown(render_document(
        "(none)",
        "(none)",
        "- No new mail today",
        "",
        None,
    ))
}

/// A fully local report rendered from the scored threads and heuristic
/// labels alone, used when provider generation has failed. Reproduces the
/// same four-section shape so downstream parsing is format-agnostic.
pub fn fallback_report(scored: &[ScoredThread]) -> SummaryDocument {
    let mut important_entries: Vec<String> = Vec::new();
    let mut other_entries: Vec<String> = Vec::new();
    let mut high_count = 0usize;
    let mut total_messages = 0usize;

    for entry in scored {
        let thread = &entry.thread;
        total_messages += thread.message_count;
        let sender = thread
            .messages
            .first()
            .map(|m| {
                m.sender_name
                    .clone()
                    .or_else(|| m.from_addr.clone())
                    .unwrap_or_else(|| "unknown".to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        if entry.score >= IMPORTANT_THRESHOLD {
            high_count += 1;
            if important_entries.len() < 10 {
                let mut lines = vec![
                    format!("**{}**", thread.subject),
                    format!("- **From**: {}", sender),
                    format!("- **Importance**: {:.1}", entry.score),
                    format!("- **Messages**: {}", thread.message_count),
                ];
                if thread.has_attachments {
                    lines.push("- Has attachments".to_string());
                }
                if let Some(snippet) = thread.messages.first().map(|m| m.snippet.as_str()) {
                    if !snippet.is_empty() {
                        lines.push(format!(
                            "- Content: {}...",
                            snippet.chars().take(100).collect::<String>()
                        ));
                    }
                }
                important_entries.push(lines.join("\n"));
            }
        } else if other_entries.len() < 20 {
            other_entries.push(format!(
                "- **{}** (from {}, {} priority, importance {:.1})",
                thread.subject,
                sender,
                priority_label(entry.score),
                entry.score
            ));
        }
    }

    let important = if important_entries.is_empty() {
        "(none)".to_string()
    } else {
        important_entries.join("\n\n")
    };
    let non_important = if other_entries.is_empty() {
        "(none)".to_string()
    } else {
        other_entries.join("\n")
    };

    let mut highlights = vec![format!(
        "- {} email threads received ({} messages)",
        scored.len(),
        total_messages
    )];
    if high_count > 0 {
        highlights.push(format!("- {} high-priority threads need attention", high_count));
    }

    let action_items = if high_count > 0 {
        "- [ ] Review the important emails"
    } else {
        "- [ ] Review today's mail"
    };

    document_from_markdown(render_document(
        &important,
        &non_important,
        &highlights.join("\n"),
        action_items,
        Some("*This report was generated without the AI provider.*"),
    ))
}

/// Re-parses a final Markdown document to populate the flat highlight/todo
/// lists and section map, so every report (generated, fallback, or empty)
/// exposes the same structure.
pub fn document_from_markdown(content: String) -> SummaryDocument {
    let parsed = parse_markdown(&content);
    let mut document = SummaryDocument::markdown(content);
    document.highlights = parsed.highlights;
    document.todos = parsed.todos;
    document.sections = parsed.sections.into_iter().collect();
    document
}

/// Renders the four fixed top-level sections, in fixed order.
fn render_document(
    important: &str,
    non_important: &str,
    highlights: &str,
    action_items: &str,
    preamble: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(preamble) = preamble {
        parts.push(preamble.to_string());
    }
    for (title, body) in [
        (SECTION_IMPORTANT, important),
        (SECTION_NON_IMPORTANT, non_important),
        (SECTION_HIGHLIGHTS, highlights),
        (SECTION_ACTION_ITEMS, action_items),
    ] {
        parts.push(format!("## {}\n\n{}", title, body.trim()));
    }
    parts.join("\n\n")
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_bodies<'a>(bodies: impl Iterator<Item = &'a str>) -> String {
    let non_empty: Vec<&str> = bodies.map(str::trim).filter(|b| !b.is_empty()).collect();
    if non_empty.is_empty() {
        "(none)".to_string()
    } else {
        non_empty.join("\n\n")
    }
}
