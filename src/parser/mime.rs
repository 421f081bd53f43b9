//! MIME structure: content-type parameters, multipart framing, and the
//! recursive walk that collects bodies, attachments and embedded files.

use std::fmt;

use tracing::debug;

use crate::config::DecoderConfig;
use crate::error::{DecodeError, Result};
use crate::model::attachment::{Attachment, EmbeddedFile};
use crate::model::mail::HeaderMap;
use crate::parser::charset;
use crate::parser::encoding::decode_content;
use crate::parser::header::{decode_sentence, split_header_block};

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";

/// The multipart subtypes the walker descends into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartKind {
    Mixed,
    Alternative,
    Related,
}

impl MultipartKind {
    /// Map a lowercase media type to a walkable multipart kind.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type {
            "multipart/mixed" => Some(Self::Mixed),
            "multipart/alternative" => Some(Self::Alternative),
            "multipart/related" => Some(Self::Related),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mixed => "multipart/mixed",
            Self::Alternative => "multipart/alternative",
            Self::Related => "multipart/related",
        }
    }
}

impl fmt::Display for MultipartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Content-Type / Content-Disposition ──────────────────────────

/// A parsed `type/subtype; key=value` header.
///
/// The media type is lowercased. Parameter names are lowercased and RFC 2231
/// extended (`name*=`) and continued (`name*0=`, `name*1*=`) values are
/// resolved into plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub mime_type: String,
    params: Vec<(String, String)>,
}

impl ContentType {
    /// Parse a Content-Type (or Content-Disposition) header value.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let (media, rest) = raw.split_once(';').unwrap_or((raw, ""));
        let mime_type = media.trim().to_ascii_lowercase();
        if mime_type.is_empty() {
            return Err("no media type".into());
        }
        let (main, sub) = match mime_type.split_once('/') {
            Some((main, sub)) => (main, Some(sub)),
            None => (mime_type.as_str(), None),
        };
        if !is_token(main) || sub.is_some_and(|s| !is_token(s)) {
            return Err(format!("invalid media type '{}'", media.trim()));
        }

        let params = resolve_extended_params(parse_params(rest)?);
        Ok(Self { mime_type, params })
    }

    /// Look up a parameter by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn multipart_kind(&self) -> Option<MultipartKind> {
        MultipartKind::from_mime_type(&self.mime_type)
    }
}

fn is_tspecial(c: char) -> bool {
    "()<>@,;:\\\"/[]?=".contains(c)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && c != ' ' && !is_tspecial(c)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

/// Parse `; key=value; key="quoted value"` into raw pairs.
fn parse_params(mut rest: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches([';', ' ', '\t', '\r', '\n']);
        if rest.is_empty() {
            return Ok(params);
        }

        let key_len = rest.find(|c: char| !is_token_char(c)).unwrap_or(rest.len());
        if key_len == 0 {
            return Err(format!("invalid parameter near '{rest}'"));
        }
        let key = rest[..key_len].to_ascii_lowercase();
        rest = rest[key_len..].trim_start();
        rest = rest
            .strip_prefix('=')
            .ok_or_else(|| format!("missing '=' after parameter '{key}'"))?
            .trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut chars = quoted.char_indices();
            let mut end = None;
            while let Some((i, c)) = chars.next() {
                match c {
                    '"' => {
                        end = Some(i + 1);
                        break;
                    }
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    c => value.push(c),
                }
            }
            let end = end.ok_or_else(|| format!("unterminated quoted value for '{key}'"))?;
            rest = &quoted[end..];
            value
        } else {
            let len = rest.find(|c: char| !is_token_char(c)).unwrap_or(rest.len());
            if len == 0 {
                return Err(format!("empty value for parameter '{key}'"));
            }
            let value = rest[..len].to_string();
            rest = &rest[len..];
            value
        };

        let after = rest.trim_start();
        if !after.is_empty() && !after.starts_with(';') {
            return Err(format!("unexpected text after parameter '{key}'"));
        }
        rest = after;

        if !params.iter().any(|(k, _): &(String, String)| *k == key) {
            params.push((key, value));
        }
    }
}

/// Fold RFC 2231 extended and continued parameters into plain ones.
fn resolve_extended_params(raw: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut plain: Vec<(String, String)> = Vec::new();
    // base name → (index, percent-encoded?, value)
    let mut continued: Vec<(String, Vec<(u32, bool, String)>)> = Vec::new();

    for (key, value) in raw {
        if let Some((base, section)) = key.split_once('*') {
            if section.is_empty() {
                if let Some(decoded) = decode_rfc2231_value(&value) {
                    set_param(&mut plain, base, decoded);
                }
                continue;
            }
            let (index, encoded) = match section.strip_suffix('*') {
                Some(index) => (index, true),
                None => (section, false),
            };
            if let Ok(index) = index.parse::<u32>() {
                match continued.iter_mut().find(|(b, _)| b == base) {
                    Some((_, pieces)) => pieces.push((index, encoded, value)),
                    None => continued.push((base.to_string(), vec![(index, encoded, value)])),
                }
                continue;
            }
        }
        if !plain.iter().any(|(k, _)| *k == key) {
            plain.push((key, value));
        }
    }

    for (base, mut pieces) in continued {
        pieces.sort_by_key(|(index, _, _)| *index);
        let mut charset_name = String::new();
        let mut bytes = Vec::new();
        for (expected, (index, encoded, value)) in pieces.iter().enumerate() {
            if *index as usize != expected {
                break;
            }
            if !*encoded {
                bytes.extend_from_slice(value.as_bytes());
                continue;
            }
            let mut payload = value.as_str();
            if *index == 0 {
                if let Some((cs, _lang, rest)) = split_rfc2231(value) {
                    charset_name = cs.to_string();
                    payload = rest;
                }
            }
            bytes.extend(percent_encoding::percent_decode_str(payload));
        }
        set_param(&mut plain, &base, bytes_to_string(&charset_name, &bytes));
    }

    plain
}

fn set_param(params: &mut Vec<(String, String)>, name: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == name) {
        Some((_, v)) => *v = value,
        None => params.push((name.to_string(), value)),
    }
}

fn split_rfc2231(value: &str) -> Option<(&str, &str, &str)> {
    let (charset, rest) = value.split_once('\'')?;
    let (lang, text) = rest.split_once('\'')?;
    Some((charset, lang, text))
}

/// `charset'lang'percent%20encoded` → decoded text.
fn decode_rfc2231_value(value: &str) -> Option<String> {
    let (charset_name, _lang, text) = split_rfc2231(value)?;
    let bytes: Vec<u8> = percent_encoding::percent_decode_str(text).collect();
    Some(bytes_to_string(charset_name, &bytes))
}

fn bytes_to_string(charset_name: &str, bytes: &[u8]) -> String {
    if charset_name.is_empty() {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    charset::convert_to_utf8(charset_name, bytes)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

/// Content-Type of a part; absent means `text/plain` (RFC 2045 §5.2).
fn part_content_type(headers: &HeaderMap) -> Result<ContentType> {
    match headers.get("Content-Type") {
        Some(raw) if !raw.trim().is_empty() => {
            ContentType::parse(raw).map_err(|e| DecodeError::header("Content-Type", e))
        }
        _ => Ok(ContentType {
            mime_type: TEXT_PLAIN.to_string(),
            params: Vec::new(),
        }),
    }
}

/// Filename declared by `Content-Disposition`, without directory components.
///
/// A malformed disposition counts as no filename.
pub fn disposition_filename(headers: &HeaderMap) -> Option<String> {
    let disposition = ContentType::parse(headers.get("Content-Disposition")?).ok()?;
    let filename = disposition.param("filename")?;
    let base = filename
        .trim_end_matches(|c: char| c == '/' || c == '\\')
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    (!base.is_empty()).then(|| decode_sentence(base))
}

// ── Multipart framing ───────────────────────────────────────────

/// One part of a multipart body, borrowing from the enclosing buffer.
#[derive(Debug)]
pub struct Part<'a> {
    pub headers: HeaderMap,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Preamble,
    InPart,
    Done,
}

/// Splits a multipart body into its parts (RFC 2046 §5.1.1).
///
/// The line break before a delimiter belongs to the delimiter; preamble and
/// epilogue are skipped.
pub struct MultipartReader<'a> {
    body: &'a [u8],
    delimiter: Vec<u8>,
    pos: usize,
    state: ReaderState,
}

/// A delimiter line found in the body.
struct Delimiter {
    line_start: usize,
    next_line: usize,
    close: bool,
}

impl<'a> MultipartReader<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Result<Self> {
        if boundary.is_empty() {
            return Err(DecodeError::MultipartSyntax("missing boundary parameter".into()));
        }
        Ok(Self {
            body,
            delimiter: format!("--{boundary}").into_bytes(),
            pos: 0,
            state: ReaderState::Preamble,
        })
    }

    /// Next part, or `None` once the close delimiter has been read.
    pub fn next_part(&mut self) -> Result<Option<Part<'a>>> {
        match self.state {
            ReaderState::Done => return Ok(None),
            ReaderState::Preamble => {
                let first = self.find_delimiter(self.pos).ok_or_else(|| {
                    DecodeError::MultipartSyntax("no opening boundary found".into())
                })?;
                if first.close {
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                self.pos = first.next_line;
                self.state = ReaderState::InPart;
            }
            ReaderState::InPart => {}
        }

        let start = self.pos;
        let next = self.find_delimiter(start).ok_or_else(|| {
            DecodeError::MultipartSyntax("unexpected end of body, missing closing boundary".into())
        })?;

        let mut end = next.line_start;
        if end > start && self.body[end - 1] == b'\n' {
            end -= 1;
            if end > start && self.body[end - 1] == b'\r' {
                end -= 1;
            }
        }

        let (headers, body) = split_header_block(&self.body[start..end])
            .map_err(|e| DecodeError::MultipartSyntax(format!("part header {e}")))?;

        if next.close {
            self.state = ReaderState::Done;
        } else {
            self.pos = next.next_line;
        }
        Ok(Some(Part { headers, body }))
    }

    /// Find the next delimiter line at or after the line starting at `from`.
    fn find_delimiter(&self, from: usize) -> Option<Delimiter> {
        let mut line_start = from;
        while line_start < self.body.len() {
            let line_end = memchr::memchr(b'\n', &self.body[line_start..])
                .map_or(self.body.len(), |i| line_start + i);
            let next_line = (line_end + 1).min(self.body.len());

            let line = &self.body[line_start..line_end];
            if let Some(rest) = line.strip_prefix(self.delimiter.as_slice()) {
                let (close, rest) = match rest.strip_prefix(b"--") {
                    Some(after) => (true, after),
                    None => (false, rest),
                };
                if rest.iter().all(|b| matches!(b, b' ' | b'\t' | b'\r')) {
                    return Some(Delimiter {
                        line_start,
                        next_line,
                        close,
                    });
                }
            }
            line_start = next_line;
        }
        None
    }
}

// ── Tree walk ───────────────────────────────────────────────────

/// Bodies and files collected from a multipart subtree.
///
/// Text and HTML stay as raw bytes until the message-level charset is
/// resolved.
#[derive(Debug, Default)]
pub struct Parts {
    pub text: Vec<u8>,
    pub html: Vec<u8>,
    pub attachments: Vec<Attachment>,
    pub embedded_files: Vec<EmbeddedFile>,
}

impl Parts {
    /// Fold a nested walk into this one. Bodies are replaced when
    /// `replace_bodies` is set and concatenated otherwise.
    fn merge(&mut self, nested: Parts, replace_bodies: bool) {
        if replace_bodies {
            self.text = nested.text;
            self.html = nested.html;
        } else {
            self.text.extend(nested.text);
            self.html.extend(nested.html);
        }
        self.attachments.extend(nested.attachments);
        self.embedded_files.extend(nested.embedded_files);
    }
}

/// Recursive descent over `multipart/mixed|alternative|related` bodies.
pub struct Walker<'c> {
    config: &'c DecoderConfig,
}

impl<'c> Walker<'c> {
    pub fn new(config: &'c DecoderConfig) -> Self {
        Self { config }
    }

    /// Walk a multipart body of the given kind. `depth` is 1 for the
    /// top-level body.
    pub fn walk(
        &self,
        kind: MultipartKind,
        body: &[u8],
        boundary: &str,
        depth: usize,
    ) -> Result<Parts> {
        if depth > self.config.max_depth {
            return Err(DecodeError::NestingTooDeep {
                limit: self.config.max_depth,
            });
        }

        let mut reader = MultipartReader::new(body, boundary)?;
        let mut parts = Parts::default();
        while let Some(part) = reader.next_part()? {
            self.dispatch(kind, &part, depth, &mut parts)?;
        }
        Ok(parts)
    }

    fn dispatch(
        &self,
        kind: MultipartKind,
        part: &Part<'_>,
        depth: usize,
        acc: &mut Parts,
    ) -> Result<()> {
        let content_type = part_content_type(&part.headers)?;
        let encoding = part.headers.get_or_empty("Content-Transfer-Encoding");
        debug!(
            %kind,
            depth,
            content_type = %content_type.mime_type,
            encoding,
            "Decoding part"
        );

        match content_type.mime_type.as_str() {
            TEXT_PLAIN => acc.text.extend(decode_text(part.body, encoding)?),
            TEXT_HTML => acc.html.extend(decode_text(part.body, encoding)?),
            _ => match content_type.multipart_kind() {
                Some(nested @ (MultipartKind::Alternative | MultipartKind::Related)) => {
                    let boundary = content_type.param("boundary").unwrap_or_default();
                    let inner = self.walk(nested, part.body, boundary, depth + 1)?;
                    acc.merge(inner, kind == MultipartKind::Mixed);
                }
                _ => {
                    if let Some(filename) = disposition_filename(&part.headers) {
                        acc.attachments.push(decode_attachment(part, filename, encoding)?);
                    } else if !encoding.is_empty() {
                        acc.embedded_files.push(decode_embedded(part, encoding)?);
                    } else {
                        return Err(DecodeError::UnknownContentType {
                            content_type: content_type.mime_type.clone(),
                            kind,
                        });
                    }
                }
            },
        }
        Ok(())
    }
}

/// Transfer-decode a text body and drop exactly one trailing newline.
pub fn decode_text(body: &[u8], encoding: &str) -> Result<Vec<u8>> {
    let mut decoded = decode_content(body, encoding)?;
    if decoded.ends_with(b"\r\n") {
        decoded.truncate(decoded.len() - 2);
    } else if decoded.ends_with(b"\n") {
        decoded.truncate(decoded.len() - 1);
    }
    Ok(decoded)
}

fn decode_attachment(part: &Part<'_>, filename: String, encoding: &str) -> Result<Attachment> {
    let content_type = part
        .headers
        .get_or_empty("Content-Type")
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(Attachment {
        filename,
        content_type,
        data: decode_content(part.body, encoding)?,
    })
}

fn decode_embedded(part: &Part<'_>, encoding: &str) -> Result<EmbeddedFile> {
    let cid = decode_sentence(part.headers.get_or_empty("Content-Id"));
    Ok(EmbeddedFile {
        cid: cid.trim_matches(|c: char| c == '<' || c == '>').to_string(),
        content_type: part.headers.get_or_empty("Content-Type").to_string(),
        data: decode_content(part.body, encoding)?,
    })
}
