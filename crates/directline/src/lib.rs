//! Direct Line transport - conversation plumbing for the remote assessment agent
//!
//! This crate talks to a Bot Framework Direct Line v3 endpoint:
//! - **Transport contract** (`transport`) - `open_session`, `post`, `poll`
//! - **Activities** (`activity`) - sessions, acks, activities, watermark parsing
//! - **HTTP adapter** (`client`) - reqwest implementation with bearer credentials
//!
//! # Protocol
//!
//! ```text
//! tokens/generate ──► conversations ──► POST activities ──► GET activities?watermark=n
//!   (secret)           (session)         (SendAck id|n)       (PollBatch, may be empty)
//! ```
//!
//! Direct Line never pushes a reply and never says when a reply is complete;
//! callers poll from the watermark carried in the ack and decide for
//! themselves which activity answers their message.

pub mod activity;
pub mod client;
pub mod transport;

pub use activity::{
    watermark_from_message_id, Activity, ChannelAccount, MalformedAck, OutboundMessage, PollBatch,
    SendAck, Session,
};
pub use client::DirectLineClient;
pub use transport::{ConversationTransport, TransportError};
