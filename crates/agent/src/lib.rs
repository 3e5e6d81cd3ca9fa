//! Assessment agent - drives the remote assessor through a Direct Line conversation
//!
//! The crate turns one assessment request into one remote evaluation:
//! - **Correlation** (`correlation`) - post, poll, match, recover from refusals
//! - **Reply handling** (`reply`) - refusal detection and boilerplate cleanup
//! - **Facade** (`runtime`) - validation, session acquisition, prompt rendering
//!
//! # Flow
//!
//! ```text
//! AssessmentRequest ─► prompt::build ─► CorrelationEngine::run ─► Assessment
//!                                        │  post ─► poll* ─► match
//!                                        └─ refusal ─► one nudge ─► poll*
//! ```
//!
//! A run owns its session for its whole lifetime and shares nothing mutable
//! with other runs. Bounds (attempt cap, deadline, cancellation) are enforced
//! by the engine; the facade never retries a failed run.

pub mod correlation;
pub mod reply;
pub mod runtime;

pub use correlation::{
    CorrelatedReply, CorrelationEngine, CorrelationError, CorrelationPolicy, CorrelationState,
    TimeoutReason,
};
pub use runtime::{Assessment, AssessmentError, AssessmentRuntime, SessionSource};
