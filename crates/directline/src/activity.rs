use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One conversation with the remote agent. Owned by a single assessment run.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub token: SecretString,
}

impl Session {
    pub fn new(id: impl Into<String>, token: SecretString) -> Self {
        Self { id: id.into(), token }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub session_id: String,
    pub sender_id: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(
        session_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self { session_id: session_id.into(), sender_id: sender_id.into(), text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendAck {
    pub message_id: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("message id `{message_id}` carries no numeric watermark segment")]
pub struct MalformedAck {
    pub message_id: String,
}

impl SendAck {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self { message_id: message_id.into() }
    }

    pub fn watermark(&self) -> Result<u64, MalformedAck> {
        watermark_from_message_id(&self.message_id)
    }
}

/// Parses the ordering cursor out of a Direct Line message id
/// (`<conversation>|<sequence>`). The segment after the last `|` is the
/// watermark.
pub fn watermark_from_message_id(message_id: &str) -> Result<u64, MalformedAck> {
    message_id
        .rsplit_once('|')
        .and_then(|(_, sequence)| sequence.trim().parse::<u64>().ok())
        .ok_or_else(|| MalformedAck { message_id: message_id.to_owned() })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub speak: String,
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub from: Option<ChannelAccount>,
}

impl Activity {
    pub fn replies_to(&self, message_id: &str) -> bool {
        self.reply_to_id.as_deref() == Some(message_id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBatch {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub watermark: Option<String>,
}

impl PollBatch {
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }
}
