//! Charset lookup, conversion to UTF-8, and statistical detection.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::debug;

use crate::error::{DecodeError, Result};

const ALLOW_UTF8: bool = true;
const NO_TLD: Option<&[u8]> = None;

/// Resolve a charset name to a codec.
///
/// Names are case-folded. `gb18030`, `gb-18030` and `gb2312` all map to the
/// GBK codec; everything else goes through the WHATWG label registry.
pub fn lookup_charset(name: &str) -> Result<&'static Encoding> {
    let folded = name.trim().to_ascii_lowercase();
    let label = match folded.as_str() {
        "gb18030" | "gb-18030" | "gb2312" => "gbk",
        other => other,
    };
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| DecodeError::UnsupportedCharset(name.to_string()))
}

/// Convert `bytes` declared as `charset` to UTF-8.
///
/// Malformed sequences become U+FFFD; only an unknown charset name fails.
pub fn convert_to_utf8(charset: &str, bytes: &[u8]) -> Result<String> {
    let encoding = lookup_charset(charset)?;
    Ok(decode_with(encoding, bytes))
}

fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, actual, malformed) = encoding.decode(bytes);
    if malformed {
        debug!(
            charset = actual.name(),
            "Malformed sequences replaced while converting"
        );
    }
    text.into_owned()
}

/// Guess the charset of undeclared bytes.
///
/// Returns `None` when there is nothing to detect from: empty input, or
/// plain ASCII which reads the same in every candidate.
pub fn detect_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.is_ascii() {
        return None;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    Some(detector.guess(NO_TLD, ALLOW_UTF8))
}

/// Turn an assembled text or HTML body into a `String`.
///
/// A declared `hint` wins; otherwise the detector is consulted when
/// `detect` is set. With no signal at all the bytes are taken as UTF-8.
/// The codec that was applied is returned alongside, `None` in that last case.
pub fn resolve_body_text(
    bytes: &[u8],
    hint: Option<&str>,
    detect: bool,
) -> Result<(String, Option<&'static Encoding>)> {
    if let Some(charset) = hint {
        let encoding = lookup_charset(charset)?;
        return Ok((decode_with(encoding, bytes), Some(encoding)));
    }

    let guess = if detect { detect_charset(bytes) } else { None };
    match guess {
        Some(encoding) => {
            debug!(charset = encoding.name(), "Detected body charset");
            Ok((decode_with(encoding, bytes), Some(encoding)))
        }
        None => {
            debug!("No charset signal, keeping body as UTF-8");
            Ok((String::from_utf8_lossy(bytes).into_owned(), None))
        }
    }
}

/// `true` if `charset` names UTF-8 (or its ASCII subset).
pub fn is_utf8_label(charset: &str) -> bool {
    matches!(
        charset.trim().to_ascii_lowercase().as_str(),
        "utf-8" | "utf8" | "us-ascii" | "ascii"
    )
}
