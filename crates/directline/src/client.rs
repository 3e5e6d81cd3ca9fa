use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activity::{ChannelAccount, OutboundMessage, PollBatch, SendAck, Session};
use crate::transport::{ConversationTransport, TransportError};

const DEFAULT_LOCALE: &str = "en-US";
const MESSAGE_TYPE: &str = "message";
const ERROR_BODY_LIMIT: usize = 512;

/// reqwest-backed Direct Line v3 client.
///
/// The Direct Line secret is injected at construction and only used to mint
/// per-conversation tokens (or as the bearer for a pre-established
/// conversation). The client holds no per-conversation state.
pub struct DirectLineClient {
    http: Client,
    base_url: String,
    secret: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationResponse {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Serialize)]
struct MessageActivity<'a> {
    locale: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    from: ChannelAccount,
    text: &'a str,
}

impl<'a> From<&'a OutboundMessage> for MessageActivity<'a> {
    fn from(message: &'a OutboundMessage) -> Self {
        Self {
            locale: DEFAULT_LOCALE,
            kind: MESSAGE_TYPE,
            from: ChannelAccount {
                id: message.sender_id.clone(),
                name: "User".to_owned(),
                role: "user".to_owned(),
            },
            text: &message.text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    id: String,
}

impl DirectLineClient {
    pub fn new(
        base_url: impl Into<String>,
        secret: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(request_timeout).build().map_err(|error| {
            TransportError::Request { operation: "build_client", message: error.to_string() }
        })?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, secret })
    }

    /// Session for a conversation opened out of band, authorised with the
    /// configured secret.
    pub fn reuse_session(&self, conversation_id: impl Into<String>) -> Session {
        Session::new(conversation_id, self.secret.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn execute<T>(operation: &'static str, request: RequestBuilder) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|error| TransportError::Request { operation, message: error.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, ERROR_BODY_LIMIT);
            return Err(TransportError::Status { operation, status: status.as_u16(), body });
        }

        response
            .json::<T>()
            .await
            .map_err(|error| TransportError::Decode { operation, message: error.to_string() })
    }
}

/// Shortens `text` to at most `limit` bytes without splitting a character.
fn truncate_on_char_boundary(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let cut = (0..=limit).rev().find(|index| text.is_char_boundary(*index)).unwrap_or(0);
    text.truncate(cut);
}

#[async_trait]
impl ConversationTransport for DirectLineClient {
    async fn open_session(&self) -> Result<Session, TransportError> {
        let generated: TokenResponse = Self::execute(
            "generate_token",
            self.http
                .post(self.endpoint("tokens/generate"))
                .bearer_auth(self.secret.expose_secret())
                .json(&serde_json::json!({})),
        )
        .await?;
        if generated.conversation_id.trim().is_empty() {
            return Err(TransportError::MissingIdentifier {
                operation: "generate_token",
                field: "conversationId",
            });
        }
        if generated.token.trim().is_empty() {
            return Err(TransportError::MissingIdentifier {
                operation: "generate_token",
                field: "token",
            });
        }

        let started: ConversationResponse = Self::execute(
            "start_conversation",
            self.http
                .post(self.endpoint("conversations"))
                .bearer_auth(&generated.token)
                .json(&serde_json::json!({})),
        )
        .await?;
        if started.token.trim().is_empty() {
            return Err(TransportError::MissingIdentifier {
                operation: "start_conversation",
                field: "token",
            });
        }

        let conversation_id = if started.conversation_id.trim().is_empty() {
            generated.conversation_id
        } else {
            started.conversation_id
        };

        debug!(
            event_name = "directline.session.opened",
            conversation_id = %conversation_id,
            "direct line conversation started"
        );
        Ok(Session::new(conversation_id, started.token.into()))
    }

    async fn post(
        &self,
        session: &Session,
        sender_id: &str,
        text: &str,
    ) -> Result<SendAck, TransportError> {
        let message = OutboundMessage::new(&session.id, sender_id, text);

        let resource: ResourceResponse = Self::execute(
            "post_activity",
            self.http
                .post(self.endpoint(&format!("conversations/{}/activities", message.session_id)))
                .bearer_auth(session.token.expose_secret())
                .json(&MessageActivity::from(&message)),
        )
        .await?;

        if resource.id.trim().is_empty() {
            return Err(TransportError::MissingIdentifier { operation: "post_activity", field: "id" });
        }

        debug!(
            event_name = "directline.activity.posted",
            conversation_id = %message.session_id,
            message_id = %resource.id,
            "posted activity"
        );
        Ok(SendAck::new(resource.id))
    }

    async fn poll(&self, session: &Session, watermark: u64) -> Result<PollBatch, TransportError> {
        let watermark_param = if watermark > 0 { watermark.to_string() } else { String::new() };

        let batch: PollBatch = Self::execute(
            "poll_activities",
            self.http
                .get(self.endpoint(&format!("conversations/{}/activities", session.id)))
                .bearer_auth(session.token.expose_secret())
                .query(&[("watermark", watermark_param.as_str())]),
        )
        .await?;

        debug!(
            event_name = "directline.activity.polled",
            conversation_id = %session.id,
            watermark,
            activity_count = batch.len(),
            "polled activities"
        );
        Ok(batch)
    }
}
