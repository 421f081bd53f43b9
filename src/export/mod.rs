//! Export functionality: attachment extraction and message summaries.

pub mod attachment;
pub mod summary;
