//! crates/mail_report_core/src/markdown.rs
//!
//! Best-effort extraction of structure from provider replies: top-level
//! Markdown sections, highlight/todo lists, coverage tags, and the legacy
//! brace-delimited JSON encoding. Section-title recognition and tag
//! extraction are contracts; list extraction tolerates imprecision.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::ports::GenerationResponse;

//=========================================================================================
// Section Titles
//=========================================================================================

pub const SECTION_IMPORTANT: &str = "Important Emails";
pub const SECTION_NON_IMPORTANT: &str = "Non-Important Emails";
pub const SECTION_HIGHLIGHTS: &str = "Highlights";
pub const SECTION_ACTION_ITEMS: &str = "Action Items";

/// Cap on extracted highlights.
const MAX_HIGHLIGHTS: usize = 7;

/// Matches the "non-important" section title. Checked before
/// [`is_important_title`] since its titles contain "important" as well.
pub fn is_non_important_title(title: &str) -> bool {
    let t = title.to_lowercase();
    t.contains("non-important") || t.contains("non important") || t.contains("routine")
}

pub fn is_important_title(title: &str) -> bool {
    !is_non_important_title(title) && title.to_lowercase().contains("important")
}

pub fn is_highlights_title(title: &str) -> bool {
    let t = title.to_lowercase();
    t.contains("highlight") || t.contains("discover")
}

pub fn is_todos_title(title: &str) -> bool {
    let t = title.to_lowercase();
    t.contains("todo") || t.contains("to-do") || t.contains("task") || t.contains("action")
}

//=========================================================================================
// Parsed Document
//=========================================================================================

/// The structure recovered from one provider reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// Top-level (title, body) sections in document order.
    pub sections: Vec<(String, String)>,
    pub highlights: Vec<String>,
    pub todos: Vec<String>,
    pub full_content: String,
}

impl ParsedDocument {
    /// The body of the first section whose title satisfies `pred`.
    pub fn section_body(&self, pred: impl Fn(&str) -> bool) -> Option<&str> {
        self.sections
            .iter()
            .find(|(title, _)| pred(title))
            .map(|(_, body)| body.as_str())
    }
}

/// Normalizes a reply into a [`ParsedDocument`].
///
/// Free text is first probed for the legacy JSON encoding (code fence, or
/// first `{` through last `}` with explanatory text around it); anything
/// that fails that probe is treated as Markdown.
pub fn parse_reply(response: &GenerationResponse) -> ParsedDocument {
    match response {
        GenerationResponse::Structured(value) => from_structured(value),
        GenerationResponse::FreeText(text) => {
            if let Some(value) = extract_legacy_json(text) {
                from_structured(&value)
            } else {
                parse_markdown(text)
            }
        }
    }
}

/// Splits free-text Markdown on `## ` headings and derives the highlight and
/// todo lists. When no heading is found at all, the first paragraph (up to
/// 200 characters) becomes a single highlight.
pub fn parse_markdown(text: &str) -> ParsedDocument {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            if let Some((done_title, body)) = current.take() {
                sections.push((done_title, body.join("\n").trim().to_string()));
            }
            current = Some((title.to_string(), Vec::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((title, body)) = current.take() {
        sections.push((title, body.join("\n").trim().to_string()));
    }

    let mut highlights = Vec::new();
    let mut todos = Vec::new();
    for (title, body) in &sections {
        if is_highlights_title(title) {
            for item in list_items(body) {
                if highlights.len() >= MAX_HIGHLIGHTS {
                    break;
                }
                highlights.push(item);
            }
        } else if is_todos_title(title) {
            todos.extend(list_items(body));
        }
    }

    if sections.is_empty() {
        if let Some(paragraph) = text.split("\n\n").map(str::trim).find(|p| !p.is_empty()) {
            highlights.push(paragraph.chars().take(200).collect());
        }
    }

    ParsedDocument {
        sections,
        highlights,
        todos,
        full_content: text.trim().to_string(),
    }
}

/// A top-level `## ` heading (but not `###` and deeper).
fn heading_title(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("## ")?;
    Some(rest.trim().trim_matches('#').trim())
}

/// Bullet, numbered, and checkbox list items, with checkbox markers stripped.
fn list_items(body: &str) -> Vec<String> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    static CHECKBOX: OnceLock<Regex> = OnceLock::new();
    let item = ITEM.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:[-*]|\d+[.)])\s+(.+)$").unwrap()
    });
    let checkbox = CHECKBOX.get_or_init(|| Regex::new(r"^\[.\]\s*").unwrap());

    item.captures_iter(body)
        .map(|caps| checkbox.replace(caps[1].trim(), "").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

//=========================================================================================
// Coverage Tags
//=========================================================================================

/// Every tag number mentioned in `text` as `[T<NN>]`, case-insensitive.
pub fn find_tags(text: &str) -> BTreeSet<u32> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"(?i)\[t(\d+)\]").unwrap());

    tag.captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .collect()
}

/// The 0-based positions among `expected` threads whose tags are absent from
/// `text`. The batch passes validation iff this is empty.
pub fn missing_positions(expected: usize, text: &str) -> Vec<usize> {
    let found = find_tags(text);
    (0..expected)
        .filter(|position| !found.contains(&(*position as u32 + 1)))
        .collect()
}

//=========================================================================================
// Legacy JSON Encoding
//=========================================================================================

/// Pulls a legacy JSON object out of free text: a ```json fence if present,
/// otherwise the first `{` through the last `}`. Returns `None` when the
/// candidate does not parse, in which case the text is Markdown.
fn extract_legacy_json(text: &str) -> Option<serde_json::Value> {
    let candidate = if let Some(fence_start) = text.find("```json") {
        let after = &text[fence_start + 7..];
        let fence_end = after.find("```")?;
        after[..fence_end].trim()
    } else {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        text[start..=end].trim()
    };

    serde_json::from_str(candidate).ok()
}

/// Maps the legacy structured encoding onto [`ParsedDocument`].
fn from_structured(value: &serde_json::Value) -> ParsedDocument {
    let string_list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let sections: Vec<(String, String)> = value
        .get("sections")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let full_content = value
        .get("full_content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| serde_json::to_string_pretty(value).unwrap_or_default());

    ParsedDocument {
        sections,
        highlights: string_list("highlights"),
        todos: string_list("todos"),
        full_content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_top_level_sections_in_order() {
        let text = "## Important Emails\n\nbody one\n\n## Non-Important Emails\n\nbody two\n\n### nested\nignored as a section";
        let doc = parse_markdown(text);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].0, "Important Emails");
        assert_eq!(doc.sections[0].1, "body one");
        assert!(doc.sections[1].1.contains("### nested"));
    }

    #[test]
    fn section_body_lookup_distinguishes_non_important() {
        let text = "## Important Emails\n\nA\n\n## Non-Important Emails\n\nB";
        let doc = parse_markdown(text);
        assert_eq!(doc.section_body(is_important_title), Some("A"));
        assert_eq!(doc.section_body(is_non_important_title), Some("B"));
    }

    #[test]
    fn highlights_are_capped_at_seven() {
        let items: Vec<String> = (0..10).map(|i| format!("- item {i}")).collect();
        let text = format!("## Highlights\n\n{}", items.join("\n"));
        let doc = parse_markdown(&text);
        assert_eq!(doc.highlights.len(), 7);
        assert_eq!(doc.highlights[0], "item 0");
    }

    #[test]
    fn todos_strip_checkbox_markers_and_are_uncapped() {
        let text = "## Action Items\n\n- [ ] send invoice\n- [x] book room\n1. call back\n* plain bullet";
        let doc = parse_markdown(text);
        assert_eq!(
            doc.todos,
            vec!["send invoice", "book room", "call back", "plain bullet"]
        );
    }

    #[test]
    fn numbered_highlights_are_extracted() {
        let text = "## Today's Discoveries\n\n1. first\n2) second";
        let doc = parse_markdown(text);
        assert_eq!(doc.highlights, vec!["first", "second"]);
    }

    #[test]
    fn no_sections_falls_back_to_first_paragraph() {
        let long = "x".repeat(300);
        let doc = parse_markdown(&long);
        assert!(doc.sections.is_empty());
        assert_eq!(doc.highlights.len(), 1);
        assert_eq!(doc.highlights[0].chars().count(), 200);
    }

    #[test]
    fn fenced_json_reply_is_parsed_as_structured() {
        let text = "Here is the report:\n```json\n{\"highlights\": [\"h1\"], \"todos\": [\"t1\"]}\n```";
        let doc = parse_reply(&GenerationResponse::FreeText(text.to_string()));
        assert_eq!(doc.highlights, vec!["h1"]);
        assert_eq!(doc.todos, vec!["t1"]);
    }

    #[test]
    fn brace_delimited_json_with_prefix_is_parsed() {
        let text = "Sure, here you go: {\"highlights\": [\"h1\"], \"todos\": []} hope it helps";
        let doc = parse_reply(&GenerationResponse::FreeText(text.to_string()));
        assert_eq!(doc.highlights, vec!["h1"]);
    }

    #[test]
    fn markdown_with_stray_braces_is_not_mistaken_for_json() {
        let text = "## Highlights\n\n- config uses {braces} sometimes";
        let doc = parse_reply(&GenerationResponse::FreeText(text.to_string()));
        assert_eq!(doc.highlights, vec!["config uses {braces} sometimes"]);
    }

    #[test]
    fn structured_response_maps_fields() {
        let value = serde_json::json!({
            "highlights": ["a", "b"],
            "todos": ["t"],
            "sections": {"Important Emails": "body"},
        });
        let doc = parse_reply(&GenerationResponse::Structured(value));
        assert_eq!(doc.highlights, vec!["a", "b"]);
        assert_eq!(doc.todos, vec!["t"]);
        assert_eq!(doc.section_body(is_important_title), Some("body"));
    }

    #[test]
    fn tags_are_found_case_insensitively() {
        let found = find_tags("entry [T01], entry [t02], and [T10]");
        assert_eq!(found, BTreeSet::from([1, 2, 10]));
    }

    #[test]
    fn missing_positions_reports_gaps() {
        let text = "[T01] a [T02] b [T04] d [T05] e";
        assert_eq!(missing_positions(5, text), vec![2]);
        assert!(missing_positions(5, "[T01][T02][T03][T04][T05]").is_empty());
    }
}
