//! crates/mail_report_core/src/batching.rs
//!
//! Batch planning: splits the priority-ordered thread list into contiguous,
//! bounded-size batches so a single provider call never has to cover more
//! threads than it can reliably address.

use crate::domain::ScoredThread;

/// A contiguous slice of the scored-thread ordering.
///
/// Each thread in a batch is addressed by a 1-based positional tag
/// (`T01`, `T02`, ...) scoped to this batch only; tags are not unique
/// across batches.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub index: usize,
    pub threads: &'a [ScoredThread],
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// The tags this batch expects the provider to echo back: `T01..T<len>`.
    pub fn expected_tags(&self) -> Vec<String> {
        (0..self.threads.len()).map(tag).collect()
    }
}

/// Formats the batch-scoped tag for a 0-based position.
pub fn tag(position: usize) -> String {
    format!("T{:02}", position + 1)
}

/// Splits the ordered thread list into batches of at most `max_per_batch`
/// threads. `0` means "one batch containing everything". Membership
/// preserves relative order; no thread is split, duplicated, or omitted.
pub fn plan(threads: &[ScoredThread], max_per_batch: usize) -> Vec<Batch<'_>> {
    if threads.is_empty() {
        return Vec::new();
    }
    let size = if max_per_batch == 0 {
        threads.len()
    } else {
        max_per_batch
    };

    threads
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            threads: chunk,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Thread;
    use std::collections::BTreeSet;

    fn scored(id: &str, score: f64) -> ScoredThread {
        ScoredThread {
            thread: Thread {
                thread_id: id.to_string(),
                subject: id.to_string(),
                messages: Vec::new(),
                combined_text: String::new(),
                is_truncated: false,
                participants: Vec::new(),
                sender_domains: BTreeSet::new(),
                has_attachments: false,
                message_count: 0,
                latest_timestamp: None,
            },
            score,
        }
    }

    #[test]
    fn splits_into_bounded_contiguous_batches() {
        let threads: Vec<ScoredThread> =
            (0..7).map(|i| scored(&format!("t{i}"), 50.0 - i as f64)).collect();
        let batches = plan(&threads, 3);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[1].len(), 3);
        assert_eq!(batches[2].len(), 1);

        // Order preserved, nothing lost or duplicated.
        let flat: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.threads.iter().map(|s| s.thread.thread_id.as_str()))
            .collect();
        let expected: Vec<String> = (0..7).map(|i| format!("t{i}")).collect();
        assert_eq!(flat, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn zero_means_one_batch_with_everything() {
        let threads: Vec<ScoredThread> =
            (0..5).map(|i| scored(&format!("t{i}"), 1.0)).collect();
        let batches = plan(&threads, 0);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[test]
    fn empty_input_plans_no_batches() {
        assert!(plan(&[], 10).is_empty());
    }

    #[test]
    fn tags_are_one_based_and_zero_padded() {
        assert_eq!(tag(0), "T01");
        assert_eq!(tag(9), "T10");

        let threads: Vec<ScoredThread> =
            (0..2).map(|i| scored(&format!("t{i}"), 1.0)).collect();
        let batches = plan(&threads, 10);
        assert_eq!(batches[0].expected_tags(), vec!["T01", "T02"]);
    }
}
