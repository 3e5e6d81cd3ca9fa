use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// IELTS writing task category. Task 1 is scored on task achievement, every
/// other task on task response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TaskCategory {
    Task1,
    Other(u8),
}

impl TaskCategory {
    pub fn number(self) -> u8 {
        match self {
            Self::Task1 => 1,
            Self::Other(value) => value,
        }
    }

    pub fn primary_criterion(self) -> &'static str {
        match self {
            Self::Task1 => "Task Achievement",
            Self::Other(_) => "Task Response",
        }
    }
}

impl From<u8> for TaskCategory {
    fn from(value: u8) -> Self {
        if value == 1 {
            Self::Task1
        } else {
            Self::Other(value)
        }
    }
}

impl From<TaskCategory> for u8 {
    fn from(value: TaskCategory) -> Self {
        value.number()
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub user_id: String,
    pub task_category: TaskCategory,
    pub task_statement: String,
    pub candidate_text: String,
}

impl AssessmentRequest {
    pub fn new(
        user_id: impl Into<String>,
        task_category: TaskCategory,
        task_statement: impl Into<String>,
        candidate_text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            task_category,
            task_statement: task_statement.into(),
            candidate_text: candidate_text.into(),
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.user_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("user_id is required".to_owned()));
        }
        if self.task_statement.trim().is_empty() {
            return Err(DomainError::InvariantViolation("task_statement is required".to_owned()));
        }
        if self.candidate_text.trim().is_empty() {
            return Err(DomainError::InvariantViolation("candidate_text is required".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AssessmentRequest, TaskCategory};

    #[test]
    fn category_one_is_task_achievement_everything_else_task_response() {
        assert_eq!(TaskCategory::from(1), TaskCategory::Task1);
        assert_eq!(TaskCategory::from(1).primary_criterion(), "Task Achievement");
        assert_eq!(TaskCategory::from(2), TaskCategory::Other(2));
        assert_eq!(TaskCategory::from(0).primary_criterion(), "Task Response");
    }

    #[test]
    fn category_serializes_as_plain_number() {
        let json = serde_json::to_string(&TaskCategory::Task1).expect("serialize");
        assert_eq!(json, "1");
        let parsed: TaskCategory = serde_json::from_str("2").expect("deserialize");
        assert_eq!(parsed, TaskCategory::Other(2));
    }

    #[test]
    fn blank_fields_fail_validation() {
        let request = AssessmentRequest::new("user-1", TaskCategory::Task1, "  ", "essay");
        let error = request.validate().expect_err("blank statement should be rejected");
        assert!(error.to_string().contains("task_statement"));

        let request = AssessmentRequest::new("", TaskCategory::Task1, "task", "essay");
        assert!(request.validate().is_err());

        let request = AssessmentRequest::new("user-1", TaskCategory::Task1, "task", "essay");
        assert!(request.validate().is_ok());
    }
}
