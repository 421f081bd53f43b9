//! Core message and header-map types.

use chrono::{DateTime, FixedOffset};

use super::address::Address;
use super::attachment::{Attachment, EmbeddedFile};

/// Header fields in arrival order, looked up case-insensitively.
///
/// Repeated fields keep every value in order under the spelling of the
/// first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// First value for `name`, if the field is present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// All values for `name`, in order (empty if absent).
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or_default()
    }

    /// First value for `name`, or `""` when absent.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }

    /// Iterate `(name, values)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct field names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `f` to every value, keeping names and order.
    pub fn map_values(&self, mut f: impl FnMut(&str) -> String) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(k, values)| (k.clone(), values.iter().map(|v| f(v)).collect()))
                .collect(),
        }
    }
}

/// Structured header fields, decoded from their raw header values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderFields {
    pub subject: String,
    pub sender: Option<Address>,
    pub from: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub date: Option<DateTime<FixedOffset>>,
    pub message_id: String,
    pub in_reply_to: Vec<String>,
    pub references: Vec<String>,

    pub resent_from: Vec<Address>,
    pub resent_sender: Option<Address>,
    pub resent_to: Vec<Address>,
    pub resent_date: Option<DateTime<FixedOffset>>,
    pub resent_cc: Vec<Address>,
    pub resent_bcc: Vec<Address>,
    pub resent_message_id: String,

    /// Charset named by the first encoded-word of the raw Subject.
    pub subject_charset: Option<String>,
}

/// A fully decoded message.
///
/// Depending on the top-level content type, either `content` holds an
/// opaque body, or the text/HTML bodies (plus attachments and embedded
/// files for multiparts) are populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Every header, values with encoded-words decoded.
    pub headers: HeaderMap,

    pub subject: String,
    pub sender: Option<Address>,
    pub from: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub date: Option<DateTime<FixedOffset>>,
    /// Message-ID without angle brackets.
    pub message_id: String,
    pub in_reply_to: Vec<String>,
    pub references: Vec<String>,

    pub resent_from: Vec<Address>,
    pub resent_sender: Option<Address>,
    pub resent_to: Vec<Address>,
    pub resent_date: Option<DateTime<FixedOffset>>,
    pub resent_cc: Vec<Address>,
    pub resent_bcc: Vec<Address>,
    pub resent_message_id: String,

    /// Top-level `Content-Type` exactly as declared (may be empty).
    pub content_type: String,

    /// Transfer-decoded body for top-level types that are neither a walked
    /// multipart nor `text/plain` / `text/html`.
    pub content: Option<Vec<u8>>,

    pub text_body: String,
    pub html_body: String,

    /// Attachments in depth-first encounter order.
    pub attachments: Vec<Attachment>,

    /// Embedded files in depth-first encounter order.
    pub embedded_files: Vec<EmbeddedFile>,

    /// Declared charset used for the bodies; empty when unspecified or UTF-8.
    pub original_charset: String,
}

impl Message {
    /// Build a message carrying the given header fields and nothing else.
    pub fn from_fields(headers: HeaderMap, fields: HeaderFields) -> Self {
        Self {
            headers,
            subject: fields.subject,
            sender: fields.sender,
            from: fields.from,
            reply_to: fields.reply_to,
            to: fields.to,
            cc: fields.cc,
            bcc: fields.bcc,
            date: fields.date,
            message_id: fields.message_id,
            in_reply_to: fields.in_reply_to,
            references: fields.references,
            resent_from: fields.resent_from,
            resent_sender: fields.resent_sender,
            resent_to: fields.resent_to,
            resent_date: fields.resent_date,
            resent_cc: fields.resent_cc,
            resent_bcc: fields.resent_bcc,
            resent_message_id: fields.resent_message_id,
            ..Self::default()
        }
    }

    /// Find an embedded file by the id used in a `cid:` URL.
    pub fn embedded_by_cid(&self, cid: &str) -> Option<&EmbeddedFile> {
        let cid = cid.strip_prefix("cid:").unwrap_or(cid);
        self.embedded_files.iter().find(|f| f.cid == cid)
    }
}
