//! Hand-off point between a mail transport and the decoder.
//!
//! A transport that has received a complete DATA payload calls
//! [`accept_data`]; the decoded [`Message`] goes to a [`MessageHandler`]
//! and any failure comes back as an SMTP reply the transport can send.

use std::fmt;

use tracing::{debug, warn};

use crate::config::DecoderConfig;
use crate::model::mail::Message;
use crate::parser::eml::decode_with;

/// Consumer of decoded messages.
pub trait MessageHandler {
    fn handle(&mut self, message: Message) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: FnMut(Message) -> anyhow::Result<()>,
{
    fn handle(&mut self, message: Message) -> anyhow::Result<()> {
        self(message)
    }
}

/// SMTP reply for a message that was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: u16,
    pub enhanced_code: &'static str,
    pub message: String,
}

impl Rejection {
    /// The content could not be decoded; retrying will not help.
    fn content(message: String) -> Self {
        Self {
            code: 554,
            enhanced_code: "5.6.0",
            message,
        }
    }

    /// The handler failed; the sender may retry.
    fn local(message: String) -> Self {
        Self {
            code: 451,
            enhanced_code: "4.3.0",
            message,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.code >= 500
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code, self.enhanced_code, self.message)
    }
}

impl std::error::Error for Rejection {}

/// Decode a DATA payload and pass the result to `handler`.
pub fn accept_data<H>(raw: &[u8], config: &DecoderConfig, handler: &mut H) -> Result<(), Rejection>
where
    H: MessageHandler + ?Sized,
{
    let message = decode_with(raw, config).map_err(|e| {
        warn!(error = %e, size = raw.len(), "Rejecting undecodable message");
        Rejection::content(e.to_string())
    })?;

    debug!(message_id = %message.message_id, "Delivering message");
    handler.handle(message).map_err(|e| {
        warn!(error = %e, "Message handler failed");
        Rejection::local(format!("{e:#}"))
    })
}
