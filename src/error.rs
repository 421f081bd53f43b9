//! Centralized error types for inmail.

use std::path::PathBuf;
use thiserror::Error;

use crate::parser::mime::MultipartKind;

/// All errors produced while decoding a message.
///
/// Every variant is terminal for the decode call that raised it: there is
/// no partial-message recovery.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A structured header (address, date, content-type, ...) failed to parse.
    #[error("Malformed '{field}' header: {reason}")]
    HeaderSyntax { field: String, reason: String },

    /// A multipart part had a content-type the walker cannot place.
    #[error("Can't process {kind} inner mime type: {content_type}")]
    UnknownContentType {
        content_type: String,
        kind: MultipartKind,
    },

    /// The Content-Transfer-Encoding token is not one we know.
    #[error("Unknown Content-Transfer-Encoding: {0}")]
    UnknownTransferEncoding(String),

    /// The payload could not be reversed from its declared encoding.
    #[error("Invalid {encoding} content: {reason}")]
    ContentDecode { encoding: String, reason: String },

    /// Boundary or part framing problem inside a multipart body.
    #[error("Multipart syntax error: {0}")]
    MultipartSyntax(String),

    /// The charset name does not resolve to a known codec.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// Multipart nesting exceeded the configured limit.
    #[error("Multipart nesting deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    /// The top-level header block could not be parsed.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, DecodeError>`.
pub type Result<T> = std::result::Result<T, DecodeError>;

impl DecodeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `HeaderSyntax` variant for the named field.
    pub fn header(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::HeaderSyntax {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}
