//! Decoder for a single RFC 5322 message (`.eml` file or SMTP DATA payload).

use std::path::Path;

use tracing::debug;

use crate::config::DecoderConfig;
use crate::error::{DecodeError, Result};
use crate::model::mail::Message;
use crate::parser::charset::{is_utf8_label, resolve_body_text};
use crate::parser::encoding::decode_content;
use crate::parser::header::{decode_headers, parse_header_fields, split_header_block};
use crate::parser::mime::{self, ContentType, MultipartKind, Walker, TEXT_HTML, TEXT_PLAIN};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode a message with the default [`DecoderConfig`].
pub fn decode(raw: &[u8]) -> Result<Message> {
    decode_with(raw, &DecoderConfig::default())
}

/// Read and decode the message stored at `path`.
pub fn decode_file(path: impl AsRef<Path>, config: &DecoderConfig) -> Result<Message> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| DecodeError::io(path, e))?;
    decode_with(&data, config)
}

/// Decode a message.
///
/// Header fields are parsed first and any malformed field aborts the decode
/// before the body is touched. The body is then dispatched on the top-level
/// content type: walked multiparts fill the text/HTML bodies, attachments and
/// embedded files; `text/plain` and `text/html` fill the matching body; any
/// other type is kept transfer-decoded in [`Message::content`].
pub fn decode_with(raw: &[u8], config: &DecoderConfig) -> Result<Message> {
    let raw = skip_envelope(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::MalformedMessage("empty message".into()));
    }

    let (raw_headers, body) = split_header_block(raw)
        .map_err(|e| DecodeError::MalformedMessage(format!("header block {e}")))?;
    let fields = parse_header_fields(&raw_headers)?;
    let subject_charset = fields.subject_charset.clone();

    let declared_type = raw_headers.get_or_empty("Content-Type").to_string();
    let content_type = if declared_type.trim().is_empty() {
        ContentType::parse(TEXT_PLAIN)
    } else {
        ContentType::parse(&declared_type)
    }
    .map_err(|e| DecodeError::header("Content-Type", e))?;
    let encoding = raw_headers.get_or_empty("Content-Transfer-Encoding");

    let mut message = Message::from_fields(decode_headers(&raw_headers), fields);
    message.content_type = declared_type;

    let mut text = Vec::new();
    let mut html = Vec::new();
    if let Some(kind) = content_type.multipart_kind() {
        let boundary = content_type.param("boundary").unwrap_or_default();
        let parts = Walker::new(config).walk(kind, body, boundary, 1)?;
        text = parts.text;
        html = parts.html;
        message.attachments = parts.attachments;
        message.embedded_files = parts.embedded_files;
    } else {
        match content_type.mime_type.as_str() {
            TEXT_PLAIN => text = mime::decode_text(body, encoding)?,
            TEXT_HTML => html = mime::decode_text(body, encoding)?,
            _ => message.content = Some(decode_content(body, encoding)?),
        }
    }

    let hint = subject_charset.or_else(|| content_type.param("charset").map(str::to_string));
    let mut detected = None;
    if !text.is_empty() {
        let (decoded, used) = resolve_body_text(&text, hint.as_deref(), config.detect_charset)?;
        message.text_body = decoded;
        detected = used;
    }
    if !html.is_empty() {
        let (decoded, used) = resolve_body_text(&html, hint.as_deref(), config.detect_charset)?;
        message.html_body = decoded;
        detected = detected.or(used);
    }
    message.original_charset = hint
        .or_else(|| detected.map(|encoding| encoding.name().to_string()))
        .filter(|c| !is_utf8_label(c))
        .unwrap_or_default();

    debug!(
        content_type = %content_type.mime_type,
        multipart = content_type.multipart_kind().map(MultipartKind::as_str),
        text_len = message.text_body.len(),
        html_len = message.html_body.len(),
        attachments = message.attachments.len(),
        embedded = message.embedded_files.len(),
        "Decoded message"
    );
    Ok(message)
}

/// Drop a leading UTF-8 BOM and an mbox `From ` envelope line.
///
/// `From : a@b` is a header with obsolete whitespace before the colon, not
/// an envelope; the envelope's first token (the sender) never holds a `:`.
fn skip_envelope(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let Some(rest) = data.strip_prefix(b"From ") else {
        return data;
    };
    let Some(pos) = memchr::memchr(b'\n', data) else {
        return data;
    };
    let sender = rest
        .split(|&b| b == b' ' || b == b'\t' || b == b'\r' || b == b'\n')
        .find(|token| !token.is_empty())
        .unwrap_or_default();
    if sender.is_empty() || sender.contains(&b':') {
        return data;
    }
    &data[pos + 1..]
}
