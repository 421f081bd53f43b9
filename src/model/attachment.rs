//! Decoded file parts of a message.
//!
//! Content is fully decoded and owned; the source message buffer can be
//! dropped once a value has been produced.

/// A user-facing attachment: a part that declares a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename from `Content-Disposition`, encoded-words decoded and
    /// directory components stripped.
    pub filename: String,

    /// MIME media type without parameters (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Transfer-decoded content.
    pub data: Vec<u8>,
}

/// An inline file referenced from an HTML body through a `cid:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    /// Content-ID with the surrounding angle brackets removed.
    pub cid: String,

    /// The declared `Content-Type` header value, parameters included.
    pub content_type: String,

    /// Transfer-decoded content.
    pub data: Vec<u8>,
}

impl EmbeddedFile {
    /// Media type of the declared content type, parameters stripped.
    pub fn media_type(&self) -> &str {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_media_type() {
        let file = EmbeddedFile {
            cid: "logo".into(),
            content_type: "image/png; name=\"logo.png\"".into(),
            data: Vec::new(),
        };
        assert_eq!(file.media_type(), "image/png");
    }
}
