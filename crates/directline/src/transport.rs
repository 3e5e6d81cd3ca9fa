use async_trait::async_trait;
use thiserror::Error;

use crate::activity::{PollBatch, SendAck, Session};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{operation} request failed: {message}")]
    Request { operation: &'static str, message: String },
    #[error("{operation} returned HTTP {status}: {body}")]
    Status { operation: &'static str, status: u16, body: String },
    #[error("{operation} response could not be decoded: {message}")]
    Decode { operation: &'static str, message: String },
    #[error("{operation} response lacked a usable {field}")]
    MissingIdentifier { operation: &'static str, field: &'static str },
}

impl TransportError {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Request { operation, .. }
            | Self::Status { operation, .. }
            | Self::Decode { operation, .. }
            | Self::MissingIdentifier { operation, .. } => operation,
        }
    }
}

/// Remote conversation service as seen by the correlation engine.
///
/// `open_session` and `poll` may be re-issued freely. `post` is not
/// idempotent: every call adds a message to the conversation, so callers
/// invoke it at most once per logical attempt.
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    async fn open_session(&self) -> Result<Session, TransportError>;

    async fn post(
        &self,
        session: &Session,
        sender_id: &str,
        text: &str,
    ) -> Result<SendAck, TransportError>;

    /// Activities at or after `watermark`. An empty batch is a success.
    async fn poll(&self, session: &Session, watermark: u64) -> Result<PollBatch, TransportError>;
}
