pub mod config;
pub mod domain;
pub mod errors;
pub mod prompt;

pub use domain::assessment::{AssessmentRequest, TaskCategory};
pub use domain::task_result::{TaskResult, TaskResultId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use prompt::{AssessmentReport, Criterion, PromptFormat};
