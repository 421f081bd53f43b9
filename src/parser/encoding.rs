//! Content-Transfer-Encoding decoding (RFC 2045 §6).

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::error::{DecodeError, Result};

/// Standard alphabet, tolerant of missing padding and stray trailing bits.
const BASE64_MIME: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A recognized transfer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    /// `7bit`, `8bit`, `binary`, or nothing declared.
    Identity,
}

impl TransferEncoding {
    /// Classify a header token (case-insensitive, trimmed).
    pub fn parse(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "quoted-printable" | "quotedprintable" => Ok(Self::QuotedPrintable),
            "7bit" | "8bit" | "binary" | "" => Ok(Self::Identity),
            _ => Err(DecodeError::UnknownTransferEncoding(token.to_string())),
        }
    }
}

/// Reverse the declared `encoding` on `content`, returning the raw bytes.
pub fn decode_content(content: &[u8], encoding: &str) -> Result<Vec<u8>> {
    match TransferEncoding::parse(encoding)? {
        TransferEncoding::Base64 => decode_base64(content),
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(content, quoted_printable::ParseMode::Robust).map_err(|e| {
                DecodeError::ContentDecode {
                    encoding: "quoted-printable".into(),
                    reason: e.to_string(),
                }
            })
        }
        TransferEncoding::Identity => Ok(content.to_vec()),
    }
}

fn decode_base64(content: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = content
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64_MIME
        .decode(&compact)
        .map_err(|e| DecodeError::ContentDecode {
            encoding: "base64".into(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_with_line_breaks() {
        let decoded = decode_content(b"SGVsbG8s\r\nIHdvcmxk\r\nIQ==\r\n", "base64").unwrap();
        assert_eq!(decoded, b"Hello, world!");
    }

    #[test]
    fn test_base64_without_padding() {
        assert_eq!(decode_content(b"aGk", "BASE64").unwrap(), b"hi");
    }

    #[test]
    fn test_base64_binary_bytes() {
        let decoded = decode_content(b"AP8QgA==", " base64 ").unwrap();
        assert_eq!(decoded, [0x00, 0xFF, 0x10, 0x80]);
    }

    #[test]
    fn test_base64_invalid() {
        let err = decode_content(b"@@@@", "base64").unwrap_err();
        assert!(matches!(err, DecodeError::ContentDecode { ref encoding, .. } if encoding == "base64"));
    }

    #[test]
    fn test_quoted_printable_both_spellings() {
        let input = b"caf=C3=A9 =\r\nau lait";
        let expected = "café au lait".as_bytes();
        assert_eq!(decode_content(input, "quoted-printable").unwrap(), expected);
        assert_eq!(decode_content(input, "QuotedPrintable").unwrap(), expected);
    }

    #[test]
    fn test_identity_encodings() {
        for enc in ["7bit", "8bit", "binary", "", "  "] {
            assert_eq!(decode_content(b"raw\xffbytes", enc).unwrap(), b"raw\xffbytes");
        }
    }

    #[test]
    fn test_unknown_encoding() {
        let err = decode_content(b"x", "quoted-nonsense").unwrap_err();
        assert!(
            matches!(err, DecodeError::UnknownTransferEncoding(ref t) if t == "quoted-nonsense")
        );
    }
}
