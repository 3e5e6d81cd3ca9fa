use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bandscore_core::config::{AssessmentConfig, CorrelationStrategy};
use bandscore_directline::{Activity, ConversationTransport, PollBatch, Session, TransportError};
use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reply::{clean_reply, is_rejection, NUDGE_TEXT};

/// Bounds and matching rules for one engine run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationPolicy {
    pub strategy: CorrelationStrategy,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for CorrelationPolicy {
    fn default() -> Self {
        Self {
            strategy: CorrelationStrategy::MostRecent,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
            deadline: Some(Duration::from_secs(300)),
        }
    }
}

impl CorrelationPolicy {
    pub fn from_config(config: &AssessmentConfig) -> Self {
        Self {
            strategy: config.strategy,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
            deadline: config.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrelationState {
    Idle,
    Sent,
    Polling,
    Rejected,
    Resent,
    Matched,
    Done,
    Failed,
}

impl CorrelationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sent => "sent",
            Self::Polling => "polling",
            Self::Rejected => "rejected",
            Self::Resent => "resent",
            Self::Matched => "matched",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutReason {
    Cancelled,
    Deadline,
    AttemptsExhausted,
}

impl fmt::Display for TimeoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cancelled => "cancelled",
            Self::Deadline => "deadline exceeded",
            Self::AttemptsExhausted => "poll attempts exhausted",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no reply correlated ({reason}) after {polls} polls")]
    Timeout { reason: TimeoutReason, polls: u32 },
    #[error("remote agent refused the prompt again after the recovery message")]
    RejectionExhausted { prompt: String },
}

/// Terminal value of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelatedReply {
    pub text: String,
    pub activity_id: String,
    pub polls: u32,
    pub resent: bool,
    pub trail: Vec<CorrelationState>,
}

#[derive(Debug)]
struct ActiveMessage {
    id: String,
    watermark: u64,
}

struct Run<'a> {
    session: &'a Session,
    sender_id: &'a str,
    cancel: &'a CancellationToken,
    deadline: Option<Instant>,
    state: CorrelationState,
    trail: Vec<CorrelationState>,
    consumed: HashSet<String>,
    polls: u32,
}

impl Run<'_> {
    fn enter(&mut self, next: CorrelationState) {
        debug!(
            event_name = "assessment.correlation.transition",
            session_id = %self.session.id,
            from = self.state.as_str(),
            to = next.as_str(),
            "correlation state changed"
        );
        self.state = next;
        self.trail.push(next);
    }

    /// Drives `future` unless cancellation or the deadline wins first.
    async fn guard<F>(&self, future: F) -> Result<F::Output, CorrelationError>
    where
        F: Future,
    {
        let deadline = self.deadline;
        let expiry = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(CorrelationError::Timeout { reason: TimeoutReason::Cancelled, polls: self.polls })
            }
            _ = expiry => {
                Err(CorrelationError::Timeout { reason: TimeoutReason::Deadline, polls: self.polls })
            }
            output = future => Ok(output),
        }
    }
}

/// Submit/poll/match/recover loop against one conversation.
///
/// Exactly one message is awaiting correlation at a time. A refusal is
/// answered with a single nudge; a second refusal ends the run.
pub struct CorrelationEngine {
    transport: Arc<dyn ConversationTransport>,
    policy: CorrelationPolicy,
}

impl CorrelationEngine {
    pub fn new(transport: Arc<dyn ConversationTransport>, policy: CorrelationPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn run(
        &self,
        session: &Session,
        sender_id: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<CorrelatedReply, CorrelationError> {
        let mut run = Run {
            session,
            sender_id,
            cancel,
            deadline: self.policy.deadline.map(|limit| Instant::now() + limit),
            state: CorrelationState::Idle,
            trail: vec![CorrelationState::Idle],
            consumed: HashSet::new(),
            polls: 0,
        };

        info!(
            event_name = "assessment.correlation.started",
            session_id = %session.id,
            strategy = ?self.policy.strategy,
            "submitting prompt"
        );

        match self.drive(&mut run, prompt).await {
            Ok(reply) => Ok(reply),
            Err(error) => {
                run.enter(CorrelationState::Failed);
                warn!(
                    event_name = "assessment.correlation.failed",
                    session_id = %session.id,
                    polls = run.polls,
                    error = %error,
                    "correlation run failed"
                );
                Err(error)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut Run<'_>,
        prompt: &str,
    ) -> Result<CorrelatedReply, CorrelationError> {
        let mut active = self.send(run, prompt).await?;
        run.enter(CorrelationState::Sent);
        run.enter(CorrelationState::Polling);

        let mut delay = self.policy.initial_delay;
        let mut resent = false;

        loop {
            if self.policy.max_attempts.is_some_and(|max| run.polls >= max) {
                return Err(CorrelationError::Timeout {
                    reason: TimeoutReason::AttemptsExhausted,
                    polls: run.polls,
                });
            }

            run.guard(sleep(delay)).await?;
            let batch = run.guard(self.transport.poll(run.session, active.watermark)).await??;
            run.polls += 1;

            let Some(candidate) = self.select(&batch, &active, &run.consumed) else {
                debug!(
                    event_name = "assessment.correlation.unmatched",
                    session_id = %run.session.id,
                    watermark = active.watermark,
                    activity_count = batch.len(),
                    delay_ms = delay.as_millis() as u64,
                    "no reply yet"
                );
                delay = self.policy.next_delay(delay);
                continue;
            };
            run.consumed.insert(candidate.id.clone());

            if is_rejection(&candidate.text) {
                run.enter(CorrelationState::Rejected);
                if resent {
                    return Err(CorrelationError::RejectionExhausted { prompt: prompt.to_owned() });
                }

                info!(
                    event_name = "assessment.correlation.rejected",
                    session_id = %run.session.id,
                    activity_id = %candidate.id,
                    "remote agent refused the prompt; sending recovery message"
                );
                active = self.send(run, NUDGE_TEXT).await?;
                resent = true;
                delay = self.policy.initial_delay;
                run.enter(CorrelationState::Resent);
                run.enter(CorrelationState::Polling);
                continue;
            }

            run.enter(CorrelationState::Matched);
            let text = clean_reply(&candidate.text, &candidate.speak);
            let activity_id = candidate.id.clone();
            run.enter(CorrelationState::Done);

            info!(
                event_name = "assessment.correlation.matched",
                session_id = %run.session.id,
                activity_id = %activity_id,
                polls = run.polls,
                resent,
                "reply correlated"
            );
            return Ok(CorrelatedReply {
                text,
                activity_id,
                polls: run.polls,
                resent,
                trail: run.trail.clone(),
            });
        }
    }

    async fn send(&self, run: &mut Run<'_>, text: &str) -> Result<ActiveMessage, CorrelationError> {
        let ack = run.guard(self.transport.post(run.session, run.sender_id, text)).await??;

        let watermark = match ack.watermark() {
            Ok(watermark) => watermark,
            Err(malformed) => {
                warn!(
                    event_name = "assessment.correlation.malformed_ack",
                    session_id = %run.session.id,
                    message_id = %malformed.message_id,
                    "ack carries no watermark; polling from the start of the conversation"
                );
                0
            }
        };

        run.consumed.insert(ack.message_id.clone());
        Ok(ActiveMessage { id: ack.message_id, watermark })
    }

    fn select<'b>(
        &self,
        batch: &'b PollBatch,
        active: &ActiveMessage,
        consumed: &HashSet<String>,
    ) -> Option<&'b Activity> {
        let mut fresh = batch
            .activities
            .iter()
            .rev()
            .filter(|activity| activity.kind.is_empty() || activity.kind == "message")
            .filter(|activity| !consumed.contains(&activity.id));

        match self.policy.strategy {
            CorrelationStrategy::MostRecent => fresh.next(),
            CorrelationStrategy::ReplyTo => fresh.find(|activity| activity.replies_to(&active.id)),
        }
    }
}
