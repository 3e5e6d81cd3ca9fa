use std::sync::Arc;
use std::time::Duration;

use bandscore_core::config::{AppConfig, SessionMode};
use bandscore_core::prompt::{self, AssessmentReport, PromptFormat};
use bandscore_core::{ApplicationError, AssessmentRequest, DomainError};
use bandscore_directline::{ConversationTransport, DirectLineClient, Session, TransportError};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::correlation::{CorrelationEngine, CorrelationError, CorrelationPolicy, TimeoutReason};

/// Where each run gets its conversation from.
#[derive(Clone, Debug)]
pub enum SessionSource {
    /// A fresh conversation per run.
    Open,
    /// A conversation established out of band.
    Reuse(Session),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assessment {
    pub success: bool,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AssessmentReport>,
    pub resent: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssessmentError {
    #[error(transparent)]
    InvalidRequest(#[from] DomainError),
    #[error("could not open a conversation: {0}")]
    Session(#[source] TransportError),
    #[error(transparent)]
    Transport(TransportError),
    #[error("assessment timed out ({reason}) after {polls} polls")]
    Timeout { reason: TimeoutReason, polls: u32 },
    #[error("remote agent refused the assessment prompt twice")]
    RejectionExhausted { prompt: String },
    #[error("assessment runtime misconfigured: {0}")]
    Configuration(String),
}

impl From<CorrelationError> for AssessmentError {
    fn from(error: CorrelationError) -> Self {
        match error {
            CorrelationError::Transport(source) => Self::Transport(source),
            CorrelationError::Timeout { reason, polls } => Self::Timeout { reason, polls },
            CorrelationError::RejectionExhausted { prompt } => Self::RejectionExhausted { prompt },
        }
    }
}

impl From<AssessmentError> for ApplicationError {
    fn from(error: AssessmentError) -> Self {
        match error {
            AssessmentError::InvalidRequest(domain) => Self::Domain(domain),
            AssessmentError::Session(_)
            | AssessmentError::Transport(_)
            | AssessmentError::RejectionExhausted { .. } => Self::Integration(error.to_string()),
            AssessmentError::Timeout { .. } => Self::Timeout(error.to_string()),
            AssessmentError::Configuration(message) => Self::Configuration(message),
        }
    }
}

/// Entry point for one assessment: validate, acquire a conversation, render
/// the prompt and hand it to the correlation engine.
pub struct AssessmentRuntime {
    transport: Arc<dyn ConversationTransport>,
    engine: CorrelationEngine,
    sessions: SessionSource,
    prompt_format: PromptFormat,
}

impl AssessmentRuntime {
    pub fn new(
        transport: Arc<dyn ConversationTransport>,
        policy: CorrelationPolicy,
        sessions: SessionSource,
        prompt_format: PromptFormat,
    ) -> Self {
        let engine = CorrelationEngine::new(transport.clone(), policy);
        Self { transport, engine, sessions, prompt_format }
    }

    /// Wires a Direct Line client from validated configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, AssessmentError> {
        let client = DirectLineClient::new(
            config.directline.base_url.clone(),
            config.directline.token.clone(),
            Duration::from_secs(config.directline.request_timeout_secs),
        )
        .map_err(|error| AssessmentError::Configuration(error.to_string()))?;

        let sessions = match config.assessment.session_mode {
            SessionMode::Open => SessionSource::Open,
            SessionMode::Reuse => {
                let conversation_id =
                    config.directline.default_session_id.clone().ok_or_else(|| {
                        AssessmentError::Configuration(
                            "session_mode `reuse` requires directline.default_session_id"
                                .to_owned(),
                        )
                    })?;
                SessionSource::Reuse(client.reuse_session(conversation_id))
            }
        };

        Ok(Self::new(
            Arc::new(client),
            CorrelationPolicy::from_config(&config.assessment),
            sessions,
            config.assessment.prompt_format,
        ))
    }

    pub async fn assess(
        &self,
        request: &AssessmentRequest,
        cancel: &CancellationToken,
    ) -> Result<Assessment, AssessmentError> {
        request.validate()?;

        let session = self.acquire_session(cancel).await?;
        let prompt = prompt::build_with_format(
            self.prompt_format,
            request.task_category,
            &request.task_statement,
            &request.candidate_text,
        );

        info!(
            event_name = "assessment.run.started",
            session_id = %session.id,
            user_id = %request.user_id,
            task_category = request.task_category.number(),
            "assessment started"
        );

        let reply = self.engine.run(&session, &request.user_id, &prompt, cancel).await?;
        let report = match self.prompt_format {
            PromptFormat::Json => AssessmentReport::from_reply(&reply.text),
            PromptFormat::Outline => None,
        };

        info!(
            event_name = "assessment.run.completed",
            session_id = %session.id,
            polls = reply.polls,
            resent = reply.resent,
            structured = report.is_some(),
            "assessment completed"
        );
        Ok(Assessment { success: true, text: reply.text, report, resent: reply.resent })
    }

    async fn acquire_session(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Session, AssessmentError> {
        let SessionSource::Reuse(session) = &self.sessions else {
            return tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(AssessmentError::Timeout { reason: TimeoutReason::Cancelled, polls: 0 })
                }
                opened = self.transport.open_session() => opened.map_err(AssessmentError::Session),
            };
        };
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use bandscore_core::errors::{ApplicationError, DomainError};
    use bandscore_directline::TransportError;

    use super::AssessmentError;
    use crate::correlation::{CorrelationError, TimeoutReason};

    #[test]
    fn correlation_failures_keep_their_classification() {
        let error = AssessmentError::from(CorrelationError::Timeout {
            reason: TimeoutReason::Deadline,
            polls: 4,
        });
        assert_eq!(error, AssessmentError::Timeout { reason: TimeoutReason::Deadline, polls: 4 });
        assert!(matches!(ApplicationError::from(error), ApplicationError::Timeout(_)));

        let error = AssessmentError::from(CorrelationError::RejectionExhausted {
            prompt: "prompt".to_owned(),
        });
        assert!(matches!(ApplicationError::from(error), ApplicationError::Integration(_)));
    }

    #[test]
    fn invalid_requests_map_to_domain_errors() {
        let error = AssessmentError::from(DomainError::InvariantViolation(
            "candidate_text is required".to_owned(),
        ));
        assert_eq!(
            ApplicationError::from(error),
            ApplicationError::Domain(DomainError::InvariantViolation(
                "candidate_text is required".to_owned()
            ))
        );
    }

    #[test]
    fn session_failures_are_integration_errors() {
        let error = AssessmentError::Session(TransportError::MissingIdentifier {
            operation: "generate_token",
            field: "token",
        });
        let ApplicationError::Integration(message) = ApplicationError::from(error) else {
            panic!("expected integration error");
        };
        assert!(message.contains("generate_token response lacked a usable token"));
    }
}
