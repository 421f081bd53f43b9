//! Human-readable and JSON views of a decoded message.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::model::address::Address;
use crate::model::mail::Message;

/// Serializable overview of a [`Message`], without raw file contents.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSummary {
    pub subject: String,
    pub from: Vec<Address>,
    pub sender: Option<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub date: Option<DateTime<FixedOffset>>,
    pub message_id: String,
    pub in_reply_to: Vec<String>,
    pub references: Vec<String>,
    pub content_type: String,
    pub original_charset: String,
    pub text_body: String,
    pub html_body: String,
    pub content_size: Option<usize>,
    pub attachments: Vec<FileSummary>,
    pub embedded_files: Vec<FileSummary>,
}

/// Metadata for one attachment or embedded file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    /// Filename for attachments, Content-ID for embedded files.
    pub name: String,
    pub content_type: String,
    pub size: usize,
}

impl From<&Message> for MessageSummary {
    fn from(m: &Message) -> Self {
        Self {
            subject: m.subject.clone(),
            from: m.from.clone(),
            sender: m.sender.clone(),
            reply_to: m.reply_to.clone(),
            to: m.to.clone(),
            cc: m.cc.clone(),
            bcc: m.bcc.clone(),
            date: m.date,
            message_id: m.message_id.clone(),
            in_reply_to: m.in_reply_to.clone(),
            references: m.references.clone(),
            content_type: m.content_type.clone(),
            original_charset: m.original_charset.clone(),
            text_body: m.text_body.clone(),
            html_body: m.html_body.clone(),
            content_size: m.content.as_ref().map(Vec::len),
            attachments: m
                .attachments
                .iter()
                .map(|a| FileSummary {
                    name: a.filename.clone(),
                    content_type: a.content_type.clone(),
                    size: a.data.len(),
                })
                .collect(),
            embedded_files: m
                .embedded_files
                .iter()
                .map(|f| FileSummary {
                    name: f.cid.clone(),
                    content_type: f.media_type().to_string(),
                    size: f.data.len(),
                })
                .collect(),
        }
    }
}

fn join_addresses(list: &[Address]) -> String {
    list.iter()
        .map(Address::display)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a message as plain text: headers, the text body, and a listing of
/// attached and embedded files.
pub fn render_text(message: &Message) -> String {
    let mut content = String::new();

    if let Some(date) = message.date {
        content.push_str(&format!(
            "Date:    {}\n",
            date.format("%a, %d %b %Y %H:%M:%S %z")
        ));
    }
    if !message.from.is_empty() {
        content.push_str(&format!("From:    {}\n", join_addresses(&message.from)));
    }
    if !message.to.is_empty() {
        content.push_str(&format!("To:      {}\n", join_addresses(&message.to)));
    }
    if !message.cc.is_empty() {
        content.push_str(&format!("Cc:      {}\n", join_addresses(&message.cc)));
    }
    content.push_str(&format!("Subject: {}\n", message.subject));
    if !message.original_charset.is_empty() {
        content.push_str(&format!("Charset: {}\n", message.original_charset));
    }
    content.push_str(&format!("\n{}\n", "-".repeat(72)));

    if !message.text_body.is_empty() {
        content.push('\n');
        content.push_str(&message.text_body);
        content.push('\n');
    } else if !message.html_body.is_empty() {
        content.push_str(&format!(
            "\n[HTML body, {}]\n",
            humansize::format_size(message.html_body.len(), humansize::BINARY)
        ));
    } else if let Some(data) = &message.content {
        content.push_str(&format!(
            "\n[{} content, {}]\n",
            message.content_type,
            humansize::format_size(data.len(), humansize::BINARY)
        ));
    }

    if !message.attachments.is_empty() {
        content.push_str(&format!(
            "\n[Attachments: {} file(s)]\n",
            message.attachments.len()
        ));
        for att in &message.attachments {
            let size = humansize::format_size(att.data.len(), humansize::BINARY);
            content.push_str(&format!(
                "  - {} ({}, {})\n",
                att.filename, att.content_type, size
            ));
        }
    }

    if !message.embedded_files.is_empty() {
        content.push_str(&format!(
            "\n[Embedded: {} file(s)]\n",
            message.embedded_files.len()
        ));
        for file in &message.embedded_files {
            let size = humansize::format_size(file.data.len(), humansize::BINARY);
            content.push_str(&format!(
                "  - cid:{} ({}, {})\n",
                file.cid,
                file.media_type(),
                size
            ));
        }
    }

    content
}
