//! RFC 5322 header parsing: header blocks and folding, encoded-words (RFC 2047),
//! structured fields (addresses, dates, message-ids).

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use thiserror::Error;
use tracing::trace;

use crate::error::{DecodeError, Result};
use crate::model::address::Address;
use crate::model::mail::{HeaderFields, HeaderMap};
use crate::parser::{charset, encoding};

/// Why a header block could not be split into fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct HeaderBlockError {
    /// 1-based line number inside the header block.
    pub line: usize,
    pub reason: &'static str,
}

/// Split `data` into its header fields (raw, unfolded values) and the body.
///
/// The first empty line ends the header block. Without one, everything is
/// headers and the body is empty.
pub fn split_header_block(
    data: &[u8],
) -> std::result::Result<(HeaderMap, &[u8]), HeaderBlockError> {
    let (header_end, body_start) = find_header_end(data);
    let text = decode_header_bytes(&data[..header_end]);

    let mut headers = HeaderMap::new();
    for (name, value) in unfold_headers(&text)? {
        headers.append(name, value);
    }
    Ok((headers, &data[body_start..]))
}

/// Locate the blank line separating headers from body.
///
/// Returns `(header_end, body_start)`: the header block is
/// `data[..header_end]`, the body `data[body_start..]`.
fn find_header_end(data: &[u8]) -> (usize, usize) {
    let mut pos = 0;
    while pos < data.len() {
        let Some(nl) = memchr::memchr(b'\n', &data[pos..]).map(|i| pos + i) else {
            break;
        };
        let line = &data[pos..nl];
        if line.is_empty() || line == b"\r" {
            return (pos, nl + 1);
        }
        pos = nl + 1;
    }
    (data.len(), data.len())
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0,
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(name, value)` pairs with values trimmed.
fn unfold_headers(text: &str) -> std::result::Result<Vec<(String, String)>, HeaderBlockError> {
    let mut result: Vec<(String, String)> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let fail = |reason| HeaderBlockError {
            line: idx + 1,
            reason,
        };

        if line.starts_with(' ') || line.starts_with('\t') {
            let last = result
                .last_mut()
                .ok_or_else(|| fail("continuation line before first field"))?;
            last.1.push(' ');
            last.1.push_str(line.trim());
            continue;
        }
        if line.is_empty() {
            continue;
        }

        let colon = line.find(':').ok_or_else(|| fail("missing ':' in header line"))?;
        // obs-optional: whitespace is allowed between the name and the colon
        let name = line[..colon].trim_end();
        if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b)) {
            return Err(fail("invalid header field name"));
        }
        result.push((name.to_string(), line[colon + 1..].trim().to_string()));
    }

    for (_, value) in &mut result {
        let len = value.trim_end().len();
        value.truncate(len);
    }
    Ok(result)
}

static SUBJECT_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)=\?([a-zA-Z0-9_-]+)\?[bqBQ]\?").expect("valid subject charset pattern")
});

/// Charset named by the first encoded-word in a raw Subject, if any.
pub fn subject_charset(raw_subject: &str) -> Option<String> {
    SUBJECT_CHARSET
        .captures(raw_subject)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decode a header "sentence" word by word.
///
/// The value is split on spaces and each token is tried as a single
/// RFC 2047 encoded-word. Tokens that don't decode are kept verbatim,
/// preceded by a space unless they come first. Decoded words are appended
/// as-is, with no separator in front.
///
/// Example: `"Re: =?UTF-8?B?SG9sYQ==?= there"` → `"Re:Hola there"`
pub fn decode_sentence(input: &str) -> String {
    let mut result = String::with_capacity(input.len());

    for (i, token) in input.split(' ').enumerate() {
        match decode_encoded_word(token) {
            Some(text) => result.push_str(&text),
            None => {
                if i > 0 {
                    result.push(' ');
                }
                result.push_str(token);
            }
        }
    }

    result
}

/// Decode a token that is exactly one encoded-word: `=?charset?B|Q?text?=`.
///
/// Returns `None` for anything else, including unknown charsets and bad payloads.
pub fn decode_encoded_word(token: &str) -> Option<String> {
    let inner = token.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut pieces = inner.splitn(3, '?');
    let charset = pieces.next()?;
    let method = pieces.next()?;
    let text = pieces.next()?;
    if text.contains('?') {
        return None;
    }

    // RFC 2231 §5 language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or_default();
    if charset.is_empty() {
        return None;
    }

    let bytes = match method {
        "B" | "b" => encoding::decode_content(text.as_bytes(), "base64").ok()?,
        "Q" | "q" => decode_q_encoding(text)?,
        _ => return None,
    };

    match charset::convert_to_utf8(charset, &bytes) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            trace!(token, error = %e, "Keeping encoded-word verbatim");
            None
        }
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => {
                let hi = hex_value(*bytes.get(i + 1)?)?;
                let lo = hex_value(*bytes.get(i + 2)?)?;
                result.push(hi << 4 | lo);
                i += 3;
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    Some(result)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode every header value for convenient access.
pub fn decode_headers(headers: &HeaderMap) -> HeaderMap {
    headers.map_values(decode_sentence)
}

/// Parse the structured fields of a message header.
///
/// Fields are processed in a fixed order and the first failure is returned.
pub fn parse_header_fields(headers: &HeaderMap) -> Result<HeaderFields> {
    let raw_subject = headers.get_or_empty("Subject");

    // Struct literal fields evaluate in source order, which is the processing order.
    Ok(HeaderFields {
        subject_charset: subject_charset(raw_subject),
        subject: decode_sentence(raw_subject),
        from: address_list(headers, "From")?,
        sender: single_address(headers, "Sender")?,
        reply_to: address_list(headers, "Reply-To")?,
        to: address_list(headers, "To")?,
        cc: address_list(headers, "Cc")?,
        bcc: address_list(headers, "Bcc")?,
        date: date_field(headers, "Date")?,
        resent_from: address_list(headers, "Resent-From")?,
        resent_sender: single_address(headers, "Resent-Sender")?,
        resent_to: address_list(headers, "Resent-To")?,
        resent_cc: address_list(headers, "Resent-Cc")?,
        resent_bcc: address_list(headers, "Resent-Bcc")?,
        resent_message_id: strip_message_id(headers.get_or_empty("Resent-Message-ID")),
        message_id: strip_message_id(headers.get_or_empty("Message-ID")),
        in_reply_to: message_id_list(headers.get_or_empty("In-Reply-To")),
        references: message_id_list(headers.get_or_empty("References")),
        resent_date: date_field(headers, "Resent-Date")?,
    })
}

fn single_address(headers: &HeaderMap, field: &str) -> Result<Option<Address>> {
    let raw = headers.get_or_empty(field);
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Address::parse(raw)
        .map(Some)
        .map_err(|e| DecodeError::header(field, e))
}

fn address_list(headers: &HeaderMap, field: &str) -> Result<Vec<Address>> {
    let raw = headers.get_or_empty(field);
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Address::parse_list(raw).map_err(|e| DecodeError::header(field, e))
}

fn date_field(headers: &HeaderMap, field: &str) -> Result<Option<DateTime<FixedOffset>>> {
    let raw = headers.get_or_empty(field);
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .map_err(|reason| DecodeError::header(field, reason))
}

/// Strip angle brackets and surrounding whitespace from a Message-ID.
pub fn strip_message_id(s: &str) -> String {
    s.trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
        .to_string()
}

/// Split a whitespace-separated list of Message-IDs (In-Reply-To, References).
pub fn message_id_list(s: &str) -> Vec<String> {
    s.split_whitespace().map(strip_message_id).collect()
}

const RFC5322_DATE: &str = "%d %b %Y %H:%M:%S %z";
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone, Copy)]
struct DateLayout {
    named_zone: bool,
    zone_comment: bool,
}

/// Tried in order; the first that parses wins.
const DATE_LAYOUTS: [DateLayout; 4] = [
    DateLayout {
        named_zone: false,
        zone_comment: false,
    },
    DateLayout {
        named_zone: true,
        zone_comment: false,
    },
    DateLayout {
        named_zone: false,
        zone_comment: true,
    },
    DateLayout {
        named_zone: true,
        zone_comment: true,
    },
];

/// Parse an RFC 5322 date.
///
/// Accepts `Mon, 2 Jan 2006 15:04:05 -0700`, the same with an obsolete
/// named zone (`GMT`, `EST`, ...), and either form followed by a
/// parenthesized zone comment. The day of week must be one of the seven
/// names but is not checked against the date. On failure the error of the
/// last layout is returned.
pub fn parse_date(value: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    let value = strip_weekday(value.trim())?;
    let mut last_error = String::new();
    for layout in DATE_LAYOUTS {
        match try_date_layout(value, layout) {
            Ok(dt) => return Ok(dt),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

fn try_date_layout(value: &str, layout: DateLayout) -> std::result::Result<DateTime<FixedOffset>, String> {
    let value = if layout.zone_comment {
        strip_zone_comment(value).ok_or_else(|| format!("no trailing zone comment in '{value}'"))?
    } else {
        value
    };
    let candidate: Cow<'_, str> = if layout.named_zone {
        Cow::Owned(replace_named_tz(value).ok_or_else(|| format!("no named zone in '{value}'"))?)
    } else {
        Cow::Borrowed(value)
    };
    DateTime::parse_from_str(&candidate, RFC5322_DATE).map_err(|e| format!("'{value}': {e}"))
}

/// `"Thu, 04 Jan ..."` → `"04 Jan ..."`.
fn strip_weekday(value: &str) -> std::result::Result<&str, String> {
    let (day, rest) = value
        .split_once(',')
        .ok_or_else(|| format!("missing day of week in '{value}'"))?;
    let day = day.trim();
    if !WEEKDAYS.iter().any(|name| name.eq_ignore_ascii_case(day)) {
        return Err(format!("unknown day of week '{day}' in '{value}'"));
    }
    Ok(rest.trim_start())
}

/// `"... +0000 (UTC)"` → `"... +0000"`.
fn strip_zone_comment(s: &str) -> Option<&str> {
    let without = s.strip_suffix(')')?;
    let open = without.rfind('(')?;
    let rest = without[..open].trim_end();
    (!rest.is_empty()).then_some(rest)
}

/// Replace a trailing obsolete zone name with its numeric offset.
fn replace_named_tz(s: &str) -> Option<String> {
    const ZONES: [(&str, &str); 15] = [
        ("UT", "+0000"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("Z", "+0000"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("CET", "+0100"),
        ("CEST", "+0200"),
        ("JST", "+0900"),
    ];
    let (rest, zone) = s.rsplit_once(' ')?;
    ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, offset)| format!("{rest} {offset}"))
}
