//! services/api/src/adapters/gmail.rs
//!
//! This module contains the Gmail adapter, the concrete implementation of
//! the `MailSource` port. It lists message ids for the requested window,
//! hydrates each message with `format=full`, and normalizes the raw payload
//! into the core's message shape.

use std::sync::OnceLock;

use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use mail_report_core::domain::NormalizedMessage;
use mail_report_core::ports::{FetchWindow, MailSource, MailSourceError};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const PAGE_SIZE: usize = 100;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A mail source that reads the authenticated user's Gmail inbox.
#[derive(Clone)]
pub struct GmailSource {
    http: reqwest::Client,
    access_token: String,
}

impl GmailSource {
    /// Creates a new `GmailSource` using a pre-obtained OAuth access token.
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self { http, access_token }
    }

    async fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessageListPage, MailSourceError> {
        let mut request = self
            .http
            .get(format!("{GMAIL_BASE_URL}/messages"))
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("maxResults", &page_size.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailSourceError::Other(e.to_string()))?;
        check_status(&response)?;

        response
            .json::<MessageListPage>()
            .await
            .map_err(|e| MailSourceError::Other(format!("malformed list reply: {}", e)))
    }

    async fn get_full_message(&self, id: &str) -> Result<RawMessage, MailSourceError> {
        let response = self
            .http
            .get(format!("{GMAIL_BASE_URL}/messages/{id}"))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| MailSourceError::Other(e.to_string()))?;
        check_status(&response)?;

        response
            .json::<RawMessage>()
            .await
            .map_err(|e| MailSourceError::Other(format!("malformed message reply: {}", e)))
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), MailSourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let detail = format!("gmail api returned {}", status);
    if status.as_u16() == 401 || status.as_u16() == 403 {
        Err(MailSourceError::Auth(detail))
    } else {
        Err(MailSourceError::Other(detail))
    }
}

//=========================================================================================
// `MailSource` Trait Implementation
//=========================================================================================

#[async_trait]
impl MailSource for GmailSource {
    async fn fetch(
        &self,
        window: FetchWindow,
        max_results: usize,
    ) -> Result<Vec<NormalizedMessage>, MailSourceError> {
        let query = build_query(window);
        info!(%query, "listing gmail messages");

        let unlimited = max_results == 0;
        let mut ids: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = if unlimited {
                PAGE_SIZE
            } else {
                (max_results - ids.len()).min(PAGE_SIZE)
            };
            let page = self
                .list_page(&query, remaining, page_token.as_deref())
                .await?;

            ids.extend(page.messages.unwrap_or_default().into_iter().map(|m| m.id));
            page_token = page.next_page_token;

            if page_token.is_none() || (!unlimited && ids.len() >= max_results) {
                break;
            }
        }
        if !unlimited {
            ids.truncate(max_results);
        }
        if !unlimited && ids.len() >= max_results && page_token.is_some() {
            warn!(
                max_results,
                "message cap reached with more pages available, some mail was not fetched"
            );
        }

        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get_full_message(id).await {
                Ok(raw) => messages.push(normalize(raw)),
                Err(MailSourceError::Auth(msg)) => return Err(MailSourceError::Auth(msg)),
                // One unreadable message should not sink the whole run.
                Err(e) => warn!(message_id = %id, error = %e, "skipping unreadable message"),
            }
        }

        info!(count = messages.len(), "fetched gmail messages");
        Ok(messages)
    }
}

/// Builds the Gmail search query for a fetch window. Spam and trash are
/// always excluded.
fn build_query(window: FetchWindow) -> String {
    let mut parts: Vec<String> = Vec::new();
    match window {
        FetchWindow::LastHours(hours) => parts.push(format!("newer_than:{}h", hours)),
        FetchWindow::Dates { from, to } => {
            parts.push(format!("after:{}", from.format("%Y/%m/%d")));
            // Gmail's `before:` is exclusive of the named day.
            let next_day = to + ChronoDuration::days(1);
            parts.push(format!("before:{}", next_day.format("%Y/%m/%d")));
        }
    }
    parts.push("-in:spam".to_string());
    parts.push("-in:trash".to_string());
    parts.join(" ")
}

//=========================================================================================
// Raw API Payload Structs
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListPage {
    messages: Option<Vec<MessageId>>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MessageId {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    thread_id: String,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    filename: Option<String>,
    headers: Option<Vec<Header>>,
    body: Option<PartBody>,
    parts: Option<Vec<MessagePart>>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Deserialize, Default)]
struct PartBody {
    data: Option<String>,
}

//=========================================================================================
// Normalization
//=========================================================================================

/// Converts a raw API message into the core's normalized shape.
fn normalize(raw: RawMessage) -> NormalizedMessage {
    let payload = raw.payload.unwrap_or_default();
    let snippet = clean_text(raw.snippet.as_deref().unwrap_or(""));

    let subject = header_value(&payload, "Subject").map(|s| clean_subject(&s));
    let from_header = header_value(&payload, "From");
    let from_addr = from_header.as_deref().and_then(extract_email);
    let to_addr = header_value(&payload, "To").as_deref().and_then(extract_email);
    let cc_addrs = header_value(&payload, "Cc")
        .map(|cc| {
            cc.split(',')
                .filter_map(extract_email)
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();

    let timestamp = header_value(&payload, "Date")
        .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| parse_internal_date(raw.internal_date.as_deref()));

    let body = extract_full_body(&payload);
    let body_plain = if body.is_empty() {
        snippet.clone()
    } else {
        clean_text(&body)
    };

    let attachment_names = extract_attachments(&payload);
    let has_attachments = !attachment_names.is_empty();

    NormalizedMessage {
        id: raw.id,
        thread_id: raw.thread_id,
        subject,
        from_addr,
        to_addr,
        timestamp,
        body_plain,
        snippet,
        labels: raw.label_ids.unwrap_or_default(),
        cc_addrs,
        has_attachments,
        attachment_names,
        sender_name: from_header.as_deref().and_then(extract_name),
        sender_domain: from_header.as_deref().and_then(extract_domain),
    }
}

fn header_value(payload: &MessagePart, name: &str) -> Option<String> {
    payload.headers.as_ref().and_then(|headers| {
        headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    })
}

fn parse_internal_date(millis: Option<&str>) -> Option<DateTime<Utc>> {
    let millis: i64 = millis?.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Recursively extracts the message text, preferring `text/plain` parts and
/// falling back to tag-stripped `text/html`.
fn extract_full_body(part: &MessagePart) -> String {
    if let Some(parts) = &part.parts {
        return parts
            .iter()
            .map(extract_full_body)
            .filter(|text| !text.is_empty())
            .collect::<Vec<String>>()
            .join("\n");
    }

    let data = part
        .body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .unwrap_or("");
    if data.is_empty() {
        return String::new();
    }

    match part.mime_type.as_deref() {
        Some("text/plain") => decode_body(data),
        Some("text/html") => strip_html(&decode_body(data)),
        _ => String::new(),
    }
}

fn decode_body(data: &str) -> String {
    URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn extract_attachments(part: &MessagePart) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(parts) = &part.parts {
        for sub in parts {
            names.extend(extract_attachments(sub));
        }
    } else if let Some(filename) = &part.filename {
        if !filename.is_empty() {
            names.push(filename.clone());
        }
    }
    names
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn strip_html(html: &str) -> String {
    tag_re().replace_all(html, "").into_owned()
}

/// Unescapes common HTML entities, strips tags, and collapses whitespace.
fn clean_text(text: &str) -> String {
    let unescaped = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let stripped = strip_html(&unescaped);
    whitespace_re().replace_all(&stripped, " ").trim().to_string()
}

fn subject_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(Re|Fwd|Fw):\s*").unwrap())
}

/// Drops one reply/forward prefix and collapses whitespace.
fn clean_subject(subject: &str) -> String {
    let stripped = subject_prefix_re().replace(subject, "");
    whitespace_re().replace_all(&stripped, " ").trim().to_string()
}

/// `"Jane Doe <jane@example.com>"` -> `"jane@example.com"`.
fn extract_email(addr: &str) -> Option<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return None;
    }
    if let (Some(start), Some(end)) = (addr.find('<'), addr.rfind('>')) {
        if start < end {
            return Some(addr[start + 1..end].to_string());
        }
    }
    if addr.contains('@') {
        return addr.split_whitespace().find(|p| p.contains('@')).map(str::to_string);
    }
    Some(addr.to_string())
}

/// `"Jane Doe <jane@example.com>"` -> `"Jane Doe"`; bare addresses have no name.
fn extract_name(addr: &str) -> Option<String> {
    let addr = addr.trim();
    if let Some(start) = addr.find('<') {
        let name = addr[..start].trim().trim_matches('"').trim_matches('\'').trim();
        return if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
    }
    if addr.contains('@') || addr.is_empty() {
        None
    } else {
        Some(addr.to_string())
    }
}

/// The lowercased domain of the sender's address, when one can be parsed.
fn extract_domain(addr: &str) -> Option<String> {
    let email = extract_email(addr)?;
    let domain = email.split('@').nth(1)?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn date_window_query_is_inclusive_of_both_ends() {
        let from = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        let query = build_query(FetchWindow::Dates { from, to: from });
        assert_eq!(query, "after:2026/08/20 before:2026/08/21 -in:spam -in:trash");
    }

    #[test]
    fn trailing_hours_query_uses_newer_than() {
        let query = build_query(FetchWindow::LastHours(6));
        assert_eq!(query, "newer_than:6h -in:spam -in:trash");
    }

    #[test]
    fn email_is_extracted_from_display_form() {
        assert_eq!(
            extract_email("Jane Doe <jane@example.com>").as_deref(),
            Some("jane@example.com")
        );
        assert_eq!(
            extract_email("jane@example.com").as_deref(),
            Some("jane@example.com")
        );
        assert_eq!(extract_email(""), None);
    }

    #[test]
    fn name_is_extracted_only_from_display_form() {
        assert_eq!(
            extract_name("\"Jane Doe\" <jane@example.com>").as_deref(),
            Some("Jane Doe")
        );
        assert_eq!(extract_name("jane@example.com"), None);
    }

    #[test]
    fn domain_is_lowercased() {
        assert_eq!(
            extract_domain("Jane <jane@Example.COM>").as_deref(),
            Some("example.com")
        );
        assert_eq!(extract_domain("not-an-address"), None);
    }

    #[test]
    fn reply_prefixes_are_stripped_from_subjects() {
        assert_eq!(clean_subject("Re: budget   review"), "budget review");
        assert_eq!(clean_subject("FWD: hello"), "hello");
        assert_eq!(clean_subject("plain subject"), "plain subject");
    }

    #[test]
    fn html_fallback_is_tag_stripped_and_unescaped() {
        let cleaned = clean_text("<p>Tom &amp; Jerry</p>\n  <div>again</div>");
        assert_eq!(cleaned, "Tom & Jerry again");
    }

    #[test]
    fn body_decoding_accepts_padded_and_unpadded_base64url() {
        let padded = URL_SAFE.encode("hello world");
        let unpadded = URL_SAFE_NO_PAD.encode("hello world");
        assert_eq!(decode_body(&padded), "hello world");
        assert_eq!(decode_body(&unpadded), "hello world");
    }

    #[test]
    fn multipart_bodies_join_plain_and_stripped_html_parts() {
        let part = MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            filename: None,
            headers: None,
            body: None,
            parts: Some(vec![
                MessagePart {
                    mime_type: Some("text/plain".to_string()),
                    body: Some(PartBody {
                        data: Some(URL_SAFE.encode("plain body")),
                    }),
                    ..Default::default()
                },
                MessagePart {
                    mime_type: Some("text/html".to_string()),
                    body: Some(PartBody {
                        data: Some(URL_SAFE.encode("<p>html body</p>")),
                    }),
                    ..Default::default()
                },
                MessagePart {
                    mime_type: Some("image/png".to_string()),
                    filename: Some("chart.png".to_string()),
                    ..Default::default()
                },
            ]),
        };
        // Every text part contributes, in order; non-text parts yield nothing.
        assert_eq!(extract_full_body(&part), "plain body\nhtml body");
        assert_eq!(extract_attachments(&part), vec!["chart.png"]);
    }
}
