//! Email decoding: header fields, transfer encodings, charsets, and MIME structure.

pub mod charset;
pub mod eml;
pub mod encoding;
pub mod header;
pub mod mime;
