//! crates/mail_report_core/src/importance.rs
//!
//! Rule-based importance scoring for messages and threads, and the
//! priority ordering the batch planner consumes.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{NormalizedMessage, ScoredThread, Thread};

/// Score at and above which a thread counts as "important".
///
/// This boundary is shared with the prompt composer's section contract:
/// the provider is told to place threads scoring >= this value in the
/// important section. Keep the two in sync by using this constant.
pub const IMPORTANT_THRESHOLD: f64 = 20.0;

/// Score at and above which a thread is labelled "medium" priority.
pub const MEDIUM_THRESHOLD: f64 = 10.0;

const MAX_SCORE: f64 = 100.0;

/// Heuristic weight tables. Passed explicitly into the scorer so that
/// concurrent runs with different profiles cannot interfere.
#[derive(Debug, Clone)]
pub struct ScoringRules {
    /// Label weights, keyed by upper-cased label name.
    pub labels: HashMap<String, f64>,
    /// Keyword weights, matched case-insensitively against subject + body.
    pub keywords: Vec<(String, f64)>,
    /// Sender-domain weights, keyed by lower-cased domain.
    pub sender_domains: HashMap<String, f64>,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            labels: HashMap::from([
                ("IMPORTANT".to_string(), 5.0),
                ("STARRED".to_string(), 10.0),
                ("UNREAD".to_string(), 3.0),
                ("INBOX".to_string(), 1.0),
            ]),
            keywords: vec![
                ("urgent".to_string(), 8.0),
                ("asap".to_string(), 7.0),
                ("important".to_string(), 6.0),
                ("action required".to_string(), 6.0),
                ("deadline".to_string(), 5.0),
                ("please review".to_string(), 4.0),
            ],
            sender_domains: HashMap::new(),
        }
    }
}

/// Scores threads against a fixed set of rules.
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    rules: ScoringRules,
}

impl ImportanceScorer {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    /// Scores a single message: label weights + keyword weights +
    /// sender-domain weight, clamped to [0, 100].
    pub fn score_message(&self, message: &NormalizedMessage) -> f64 {
        let mut score = 0.0;

        for label in &message.labels {
            if let Some(weight) = self.rules.labels.get(&label.to_uppercase()) {
                score += weight;
            }
        }

        let text = format!(
            "{} {}",
            message.subject.as_deref().unwrap_or(""),
            message.body_plain
        )
        .to_lowercase();
        for (keyword, weight) in &self.rules.keywords {
            if text.contains(&keyword.to_lowercase()) {
                score += weight;
            }
        }

        if let Some(domain) = &message.sender_domain {
            if let Some(weight) = self.rules.sender_domains.get(&domain.to_lowercase()) {
                score += weight;
            }
        }

        score.clamp(0.0, MAX_SCORE)
    }

    /// Scores a thread: average message score plus a capped length bonus,
    /// clamped to [0, 100].
    pub fn score_thread(&self, thread: &Thread) -> f64 {
        if thread.messages.is_empty() {
            return 0.0;
        }

        let sum: f64 = thread.messages.iter().map(|m| self.score_message(m)).sum();
        let avg = sum / thread.messages.len() as f64;
        let bonus = (thread.messages.len() as f64 * 0.5).min(5.0);

        (avg + bonus).clamp(0.0, MAX_SCORE)
    }

    /// Scores every thread and returns them sorted descending by score.
    /// Ties keep their input order (stable sort).
    pub fn prioritize(&self, threads: Vec<Thread>) -> Vec<ScoredThread> {
        let mut scored: Vec<ScoredThread> = threads
            .into_iter()
            .map(|thread| {
                let score = self.score_thread(&thread);
                ScoredThread { thread, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!(threads = scored.len(), "scored and prioritized threads");
        scored
    }
}

/// Maps a score to its coarse priority label.
pub fn priority_label(score: f64) -> &'static str {
    if score >= IMPORTANT_THRESHOLD {
        "high"
    } else if score >= MEDIUM_THRESHOLD {
        "medium"
    } else {
        "low"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threading::aggregate;

    fn message(id: &str, thread_id: &str, labels: &[&str], body: &str) -> NormalizedMessage {
        NormalizedMessage {
            id: id.to_string(),
            thread_id: thread_id.to_string(),
            subject: Some("hello".to_string()),
            from_addr: Some(format!("{id}@example.com")),
            to_addr: Some("me@example.com".to_string()),
            timestamp: None,
            body_plain: body.to_string(),
            snippet: String::new(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            cc_addrs: Vec::new(),
            has_attachments: false,
            attachment_names: Vec::new(),
            sender_name: None,
            sender_domain: Some("example.com".to_string()),
        }
    }

    #[test]
    fn label_weights_are_case_insensitive() {
        let scorer = ImportanceScorer::default();
        let msg = message("a", "t", &["starred", "unread"], "plain text");
        assert_eq!(scorer.score_message(&msg), 13.0);
    }

    #[test]
    fn keywords_match_subject_and_body() {
        let scorer = ImportanceScorer::default();
        let mut msg = message("a", "t", &[], "there is a DEADLINE on friday");
        msg.subject = Some("URGENT: numbers".to_string());
        // urgent (8) + deadline (5)
        assert_eq!(scorer.score_message(&msg), 13.0);
    }

    #[test]
    fn sender_domain_weight_applies() {
        let mut rules = ScoringRules::default();
        rules.sender_domains.insert("example.com".to_string(), 9.0);
        let scorer = ImportanceScorer::new(rules);
        let msg = message("a", "t", &[], "plain");
        assert_eq!(scorer.score_message(&msg), 9.0);
    }

    #[test]
    fn thread_bonus_is_capped_at_five() {
        let scorer = ImportanceScorer::default();
        let messages: Vec<NormalizedMessage> = (0..20)
            .map(|i| message(&format!("m{i}"), "t", &[], "plain"))
            .collect();
        let threads = aggregate(&messages);
        assert_eq!(scorer.score_thread(&threads[0]), 5.0);
    }

    #[test]
    fn prioritize_sorts_descending_and_is_stable_on_ties() {
        let scorer = ImportanceScorer::default();
        let messages = vec![
            message("a", "t-plain-1", &[], "plain"),
            message("b", "t-starred", &["STARRED"], "plain"),
            message("c", "t-plain-2", &[], "plain"),
        ];
        let threads = aggregate(&messages);
        let scored = scorer.prioritize(threads);

        assert_eq!(scored[0].thread.thread_id, "t-starred");
        // Tied plain threads keep their relative (input) order.
        assert_eq!(scored[1].thread.thread_id, "t-plain-1");
        assert_eq!(scored[2].thread.thread_id, "t-plain-2");
        assert!(scored[0].score > scored[1].score);
        assert_eq!(scored[1].score, scored[2].score);
    }

    #[test]
    fn labelled_thread_outranks_unlabelled_thread() {
        let scorer = ImportanceScorer::default();
        let messages = vec![
            message("a1", "thread-a", &["IMPORTANT", "UNREAD"], "plain"),
            message("a2", "thread-a", &["IMPORTANT", "UNREAD"], "plain"),
            message("b1", "thread-b", &[], "plain"),
        ];
        let threads = aggregate(&messages);
        let scored = scorer.prioritize(threads);

        assert_eq!(scored[0].thread.thread_id, "thread-a");
        assert_eq!(scored[1].thread.thread_id, "thread-b");
        assert!(scored[0].score > scored[1].score);
    }

    #[test]
    fn priority_label_boundaries_are_inclusive() {
        assert_eq!(priority_label(20.0), "high");
        assert_eq!(priority_label(19.999), "medium");
        assert_eq!(priority_label(10.0), "medium");
        assert_eq!(priority_label(9.999), "low");
    }
}
