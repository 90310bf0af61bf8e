//! crates/mail_report_core/src/threading.rs
//!
//! Thread aggregation: groups normalized messages by conversation id into
//! `Thread` records with a merged, size-capped text rendering.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::domain::{NormalizedMessage, Thread};

/// Maximum length of a thread's combined text, in characters.
pub const MAX_COMBINED_LEN: usize = 12_000;

/// Minimum budget left for it to be worth rendering a partial message.
const MIN_PARTIAL_LEN: usize = 100;

/// Groups messages into threads and sorts the result by recency
/// (latest timestamp descending, threads with no dated messages last).
///
/// Empty input yields an empty list, not an error.
pub fn aggregate(messages: &[NormalizedMessage]) -> Vec<Thread> {
    aggregate_with_cap(messages, MAX_COMBINED_LEN)
}

/// Same as [`aggregate`] with an explicit combined-text cap.
pub fn aggregate_with_cap(messages: &[NormalizedMessage], cap: usize) -> Vec<Thread> {
    if messages.is_empty() {
        return Vec::new();
    }

    // Group by thread id, preserving first-seen group order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<NormalizedMessage>> = HashMap::new();
    for message in messages {
        let group = groups.entry(message.thread_id.clone()).or_insert_with(|| {
            order.push(message.thread_id.clone());
            Vec::new()
        });
        group.push(message.clone());
    }

    info!(
        messages = messages.len(),
        threads = order.len(),
        "aggregated messages into threads"
    );

    let mut threads: Vec<Thread> = order
        .into_iter()
        .map(|thread_id| {
            let group = groups.remove(&thread_id).unwrap_or_default();
            build_thread(thread_id, group, cap)
        })
        .collect();

    // Most recent thread first; `None` sorts after every `Some` here.
    threads.sort_by(|a, b| b.latest_timestamp.cmp(&a.latest_timestamp));
    threads
}

fn build_thread(thread_id: String, mut messages: Vec<NormalizedMessage>, cap: usize) -> Thread {
    // Chronological ascending; messages lacking a timestamp sort first.
    messages.sort_by_key(|m| m.timestamp);

    let subject = messages
        .first()
        .and_then(|m| m.subject.clone())
        .unwrap_or_else(|| "(no subject)".to_string());

    let mut participants: BTreeSet<String> = BTreeSet::new();
    let mut sender_domains: BTreeSet<String> = BTreeSet::new();
    let mut has_attachments = false;
    let mut latest_timestamp = None;

    for message in &messages {
        if let Some(from) = &message.from_addr {
            participants.insert(from.clone());
        }
        if let Some(to) = &message.to_addr {
            participants.insert(to.clone());
        }
        for cc in &message.cc_addrs {
            participants.insert(cc.clone());
        }
        if let Some(domain) = &message.sender_domain {
            sender_domains.insert(domain.clone());
        }
        has_attachments |= message.has_attachments;
        if message.timestamp > latest_timestamp {
            latest_timestamp = message.timestamp;
        }
    }

    let (combined_text, is_truncated) = combine_text(&messages, cap);

    Thread {
        thread_id,
        subject,
        message_count: messages.len(),
        messages,
        combined_text,
        is_truncated,
        participants: participants.into_iter().collect(),
        sender_domains,
        has_attachments,
        latest_timestamp,
    }
}

/// Renders every message through a fixed template and concatenates the
/// results until the cap is reached. When the next rendering would exceed
/// the cap, the remainder of that message is truncated to fill the budget
/// (with an ellipsis) and an omission marker replaces the rest of the
/// thread.
fn combine_text(messages: &[NormalizedMessage], cap: usize) -> (String, bool) {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;
    let mut is_truncated = false;

    for (i, message) in messages.iter().enumerate() {
        let rendered = render_message(i, message);
        let len = rendered.chars().count();

        if total + len > cap {
            let remaining = cap - total;
            if remaining > MIN_PARTIAL_LEN {
                let mut partial: String = rendered.chars().take(remaining).collect();
                partial.push_str("...");
                parts.push(partial);
            }
            parts.push(format!(
                "[thread too long; {} messages omitted]",
                messages.len() - i
            ));
            is_truncated = true;
            break;
        }

        parts.push(rendered);
        total += len;
    }

    (parts.join("\n\n"), is_truncated)
}

fn render_message(index: usize, message: &NormalizedMessage) -> String {
    let sender_display = message
        .sender_name
        .as_deref()
        .or(message.from_addr.as_deref())
        .unwrap_or("unknown");
    let from_addr = message.from_addr.as_deref().unwrap_or("unknown");
    let date = message
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut attachment_info = String::new();
    if message.has_attachments {
        if message.attachment_names.is_empty() {
            attachment_info.push_str("\nHas attachments");
        } else {
            let shown: Vec<&str> = message
                .attachment_names
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            attachment_info.push_str(&format!("\nAttachments: {}", shown.join(", ")));
            if message.attachment_names.len() > 3 {
                attachment_info
                    .push_str(&format!(" (+{} more)", message.attachment_names.len() - 3));
            }
        }
    }

    format!(
        "Message {}:\nFrom: {} ({})\nDate: {}{}\nBody: {}\n---",
        index + 1,
        sender_display,
        from_addr,
        date,
        attachment_info,
        message.body_plain
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, thread_id: &str, hour: Option<u32>) -> NormalizedMessage {
        NormalizedMessage {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
            subject: Some(format!("subject-{id}")),
            from_addr: Some(format!("{id}@example.com")),
            to_addr: Some("me@example.com".to_string()),
            timestamp: hour.map(|h| Utc.with_ymd_and_hms(2026, 8, 20, h, 0, 0).unwrap()),
            body_plain: format!("body of {id}"),
            snippet: format!("snippet {id}"),
            labels: vec!["INBOX".to_string()],
            cc_addrs: Vec::new(),
            has_attachments: false,
            attachment_names: Vec::new(),
            sender_name: None,
            sender_domain: Some("example.com".to_string()),
        }
    }

    #[test]
    fn empty_input_yields_empty_thread_list() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn messages_sorted_ascending_with_undated_first() {
        let input = vec![
            message("b", "t1", Some(12)),
            message("a", "t1", None),
            message("c", "t1", Some(9)),
        ];
        let threads = aggregate(&input);
        assert_eq!(threads.len(), 1);
        let ids: Vec<&str> = threads[0].messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn no_message_dropped_or_duplicated() {
        let input = vec![
            message("a", "t1", Some(1)),
            message("b", "t2", Some(2)),
            message("c", "t1", Some(3)),
            message("d", "t3", None),
        ];
        let threads = aggregate(&input);
        let total: usize = threads.iter().map(|t| t.messages.len()).sum();
        assert_eq!(total, input.len());

        let mut seen: Vec<&str> = threads
            .iter()
            .flat_map(|t| t.messages.iter().map(|m| m.id.as_str()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn subject_comes_from_earliest_message() {
        let mut late = message("late", "t1", Some(15));
        late.subject = Some("Re: kickoff".to_string());
        let mut early = message("early", "t1", Some(8));
        early.subject = Some("kickoff".to_string());

        let threads = aggregate(&[late, early]);
        assert_eq!(threads[0].subject, "kickoff");
    }

    #[test]
    fn metadata_is_merged_across_messages() {
        let mut a = message("a", "t1", Some(8));
        a.cc_addrs = vec!["cc@example.com".to_string()];
        let mut b = message("b", "t1", Some(10));
        b.has_attachments = true;

        let threads = aggregate(&[a, b]);
        let thread = &threads[0];
        assert!(thread.has_attachments);
        assert_eq!(thread.message_count, 2);
        assert!(thread.participants.contains(&"cc@example.com".to_string()));
        assert!(thread.participants.contains(&"a@example.com".to_string()));
        assert_eq!(
            thread.latest_timestamp,
            Some(Utc.with_ymd_and_hms(2026, 8, 20, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn threads_sorted_by_recency_with_undated_last() {
        let input = vec![
            message("a", "old", Some(1)),
            message("b", "undated", None),
            message("c", "new", Some(20)),
        ];
        let threads = aggregate(&input);
        let order: Vec<&str> = threads.iter().map(|t| t.thread_id.as_str()).collect();
        assert_eq!(order, vec!["new", "old", "undated"]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let input = vec![
            message("a", "t1", Some(3)),
            message("b", "t2", None),
            message("c", "t1", Some(5)),
        ];
        assert_eq!(aggregate(&input), aggregate(&input));
    }

    #[test]
    fn exact_cap_fit_is_not_truncated() {
        let msg = message("a", "t1", Some(9));
        let rendered_len = render_message(0, &msg).chars().count();

        let threads = aggregate_with_cap(std::slice::from_ref(&msg), rendered_len);
        assert!(!threads[0].is_truncated);
        assert!(!threads[0].combined_text.contains("omitted"));
    }

    #[test]
    fn one_char_over_cap_truncates() {
        let msg = message("a", "t1", Some(9));
        let rendered_len = render_message(0, &msg).chars().count();

        let threads = aggregate_with_cap(std::slice::from_ref(&msg), rendered_len - 1);
        assert!(threads[0].is_truncated);
        assert!(threads[0].combined_text.contains("1 messages omitted"));
    }

    #[test]
    fn partial_message_rendered_when_budget_allows() {
        let mut first = message("a", "t1", Some(9));
        first.body_plain = "x".repeat(200);
        let mut second = message("b", "t1", Some(10));
        second.body_plain = "y".repeat(500);

        let first_len = render_message(0, &first).chars().count();
        // Leave more than MIN_PARTIAL_LEN of budget for the second message.
        let threads = aggregate_with_cap(&[first, second], first_len + 150);
        let thread = &threads[0];
        assert!(thread.is_truncated);
        assert!(thread.combined_text.contains("..."));
        assert!(thread.combined_text.contains("1 messages omitted"));
        assert!(thread.combined_text.chars().count() <= first_len + 150 + 80);
    }
}
