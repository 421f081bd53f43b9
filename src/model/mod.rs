//! Core data model types for decoded messages, addresses, and attachments.

pub mod address;
pub mod attachment;
pub mod mail;
