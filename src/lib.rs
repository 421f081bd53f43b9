//! `inmail`: a strict decoder for inbound RFC 5322 / MIME messages.
//!
//! This crate turns raw message bytes into a [`Message`] with decoded header
//! fields, UTF-8 text and HTML bodies, attachments, and embedded files.
//! Malformed input fails with a [`DecodeError`] instead of being guessed at.

pub mod config;
pub mod delivery;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;

pub use config::DecoderConfig;
pub use error::{DecodeError, Result};
pub use model::mail::Message;
pub use parser::eml::{decode, decode_file, decode_with};
