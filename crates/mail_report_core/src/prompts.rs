//! crates/mail_report_core/src/prompts.rs
//!
//! Prompt composition: renders batches, repair requests, and the finalize
//! request into (system, user) text pairs for the generation provider. The
//! instruction blocks encode the coverage protocol: two mandatory sections
//! and a per-thread tag the provider must echo back.

use chrono::NaiveDate;

use crate::batching::{tag, Batch};
use crate::domain::ScoredThread;
use crate::importance::IMPORTANT_THRESHOLD;
use crate::markdown::{SECTION_ACTION_ITEMS, SECTION_HIGHLIGHTS, SECTION_IMPORTANT, SECTION_NON_IMPORTANT};

/// A rendered provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn batch_system_prompt() -> String {
    format!(
        r#"You are an email assistant producing a daily mail report.

Core rule: every thread description is prefixed with a tag like [T01] and carries an importance score.
- Threads with importance >= {threshold:.0} belong in the "{important}" section.
- Threads with importance < {threshold:.0} belong in the "{non_important}" section.

Coverage contract (mandatory):
- Your reply must contain exactly two top-level Markdown sections, in this order:
  ## {important}
  ## {non_important}
- Every input tag must appear exactly once across the two sections, at the start of its entry.
- Never skip a thread, even if it looks like noise; put it in "{non_important}" instead.

Entry format for "{important}" (exactly these three fields, nothing else):

**[Txx] [subject]**
- **From**: name (address)
- **Date**: YYYY-MM-DD HH:MM
- **Summary**: 2-3 sentences covering the main content

Entry format for "{non_important}" (sender plus a one-sentence summary, no date, no other fields):

**[Txx] [subject]** — **From**: name (address). One-sentence summary."#,
        threshold = IMPORTANT_THRESHOLD,
        important = SECTION_IMPORTANT,
        non_important = SECTION_NON_IMPORTANT,
    )
}

/// Renders the request for one batch.
pub fn compose_batch(batch: &Batch<'_>, report_date: NaiveDate) -> Prompt {
    let mut user_parts = vec![
        format!(
            "Analyze the email threads for {} and produce the daily report.",
            report_date.format("%Y-%m-%d")
        ),
        String::new(),
        format!("{} email threads:", batch.len()),
        String::new(),
    ];

    for (position, scored) in batch.threads.iter().enumerate() {
        user_parts.push(thread_block(position, scored));
        user_parts.push(String::new());
    }

    user_parts.push("Constraints:".to_string());
    user_parts.push(format!(
        "- Place threads with importance >= {:.0} in \"{}\" and the rest in \"{}\".",
        IMPORTANT_THRESHOLD, SECTION_IMPORTANT, SECTION_NON_IMPORTANT
    ));
    user_parts.push(
        "- Echo every [Txx] tag exactly once, at the start of its entry.".to_string(),
    );
    user_parts.push(
        "- Keep strictly to the entry formats in the system instructions.".to_string(),
    );

    Prompt {
        system: batch_system_prompt(),
        user: user_parts.join("\n"),
    }
}

/// Renders the degenerate request for a day without any mail.
pub fn compose_empty(report_date: NaiveDate) -> Prompt {
    Prompt {
        system: "You are an email assistant.".to_string(),
        user: format!(
            "There is no new mail for {}.\n\nProduce a short Markdown report saying so.",
            report_date.format("%Y-%m-%d")
        ),
    }
}

/// Renders the gap-filling request: only the threads whose tags were missing
/// from the first reply, keeping their original batch-scoped tag values.
pub fn compose_repair(batch: &Batch<'_>, missing_positions: &[usize]) -> Prompt {
    let tags: Vec<String> = missing_positions.iter().map(|&p| tag(p)).collect();

    let mut user_parts = vec![
        "Your previous reply omitted entries for some tagged threads.".to_string(),
        format!(
            "Produce entries for exactly these tags and no others: {}.",
            tags.join(", ")
        ),
        format!(
            "Reply with the same two sections (\"{}\" and \"{}\"), containing only the missing entries in the prescribed format.",
            SECTION_IMPORTANT, SECTION_NON_IMPORTANT
        ),
        String::new(),
    ];

    for &position in missing_positions {
        if let Some(scored) = batch.threads.get(position) {
            user_parts.push(thread_block(position, scored));
            user_parts.push(String::new());
        }
    }

    Prompt {
        system: batch_system_prompt(),
        user: user_parts.join("\n"),
    }
}

/// Renders the cross-batch finalize request: the two assembled section texts
/// as context, asking only for highlights and action items. No tag coverage
/// is required here; finalize content is free-form.
pub fn compose_finalize(important: &str, non_important: &str, report_date: NaiveDate) -> Prompt {
    let system = format!(
        r#"You distill a full daily mail report into its essentials.

Reply with exactly two Markdown sections, in this order:

## {highlights}

3-5 bullet points with the most consequential findings of the day.

## {action_items}

A bullet list of concrete follow-up tasks, one per line. Use "- [ ] task" items."#,
        highlights = SECTION_HIGHLIGHTS,
        action_items = SECTION_ACTION_ITEMS,
    );

    let user = format!(
        "Daily mail report for {date}.\n\n## {important_title}\n\n{important}\n\n## {non_important_title}\n\n{non_important}\n\nExtract the highlights and action items.",
        date = report_date.format("%Y-%m-%d"),
        important_title = SECTION_IMPORTANT,
        non_important_title = SECTION_NON_IMPORTANT,
    );

    Prompt { system, user }
}

fn thread_block(position: usize, scored: &ScoredThread) -> String {
    let thread = &scored.thread;
    let mut lines = vec![
        format!(
            "### [{}] Thread {} (importance: {:.1})",
            tag(position),
            position + 1,
            scored.score
        ),
        format!("Subject: {}", thread.subject),
        format!("Messages: {}", thread.message_count),
    ];

    if !thread.participants.is_empty() {
        let shown: Vec<&str> = thread
            .participants
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        let mut line = format!("Participants: {}", shown.join(", "));
        if thread.participants.len() > 3 {
            line.push_str(&format!(" (+{} more)", thread.participants.len() - 3));
        }
        lines.push(line);
    }

    if thread.has_attachments {
        lines.push("Has attachments".to_string());
    }

    lines.push(format!("Content:\n{}", thread.combined_text));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::plan;
    use crate::domain::Thread;
    use std::collections::BTreeSet;

    fn scored(id: &str, score: f64) -> ScoredThread {
        ScoredThread {
            thread: Thread {
                thread_id: id.to_string(),
                subject: format!("subject {id}"),
                messages: Vec::new(),
                combined_text: format!("combined text of {id}"),
                is_truncated: false,
                participants: vec![
                    "a@example.com".to_string(),
                    "b@example.com".to_string(),
                    "c@example.com".to_string(),
                    "d@example.com".to_string(),
                ],
                sender_domains: BTreeSet::new(),
                has_attachments: true,
                message_count: 2,
                latest_timestamp: None,
            },
            score,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 20).unwrap()
    }

    #[test]
    fn batch_prompt_tags_every_thread() {
        let threads = vec![scored("a", 30.0), scored("b", 5.0)];
        let batches = plan(&threads, 10);
        let prompt = compose_batch(&batches[0], date());

        assert!(prompt.user.contains("[T01]"));
        assert!(prompt.user.contains("[T02]"));
        assert!(prompt.user.contains("subject a"));
        assert!(prompt.user.contains("combined text of b"));
        assert!(prompt.user.contains("(+1 more)"));
        assert!(prompt.system.contains("importance >= 20"));
        assert!(prompt.system.contains(SECTION_IMPORTANT));
        assert!(prompt.system.contains(SECTION_NON_IMPORTANT));
    }

    #[test]
    fn repair_prompt_keeps_original_tags() {
        let threads = vec![scored("a", 30.0), scored("b", 5.0), scored("c", 5.0)];
        let batches = plan(&threads, 10);
        let prompt = compose_repair(&batches[0], &[2]);

        assert!(prompt.user.contains("exactly these tags and no others: T03"));
        assert!(prompt.user.contains("[T03]"));
        assert!(!prompt.user.contains("[T01]"));
        assert!(prompt.user.contains("subject c"));
        assert!(!prompt.user.contains("subject a"));
    }

    #[test]
    fn finalize_prompt_carries_both_sections_and_no_tag_contract() {
        let prompt = compose_finalize("important body", "routine body", date());
        assert!(prompt.user.contains("important body"));
        assert!(prompt.user.contains("routine body"));
        assert!(prompt.system.contains(SECTION_HIGHLIGHTS));
        assert!(prompt.system.contains(SECTION_ACTION_ITEMS));
        assert!(!prompt.system.contains("[T"));
    }

    #[test]
    fn empty_prompt_mentions_the_date() {
        let prompt = compose_empty(date());
        assert!(prompt.user.contains("2026-08-20"));
        assert!(prompt.user.contains("no new mail"));
    }
}
