use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskResultId(pub String);

impl TaskResultId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// A scored writing submission kept for later review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: TaskResultId,
    pub name: String,
    pub score: f64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(name: impl Into<String>, score: f64, comment: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskResultId::generate(),
            name: name.into(),
            score,
            comment: comment.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("task result's id is empty".to_owned()));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("task result's name is empty".to_owned()));
        }
        if !self.score.is_finite() || self.score < 0.0 || self.score > 9.0 {
            return Err(DomainError::InvariantViolation(
                "task result's score must be a band between 0 and 9".to_owned(),
            ));
        }
        Ok(())
    }
}
