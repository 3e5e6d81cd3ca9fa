use async_trait::async_trait;
use thiserror::Error;

use bandscore_core::domain::task_result::{TaskResult, TaskResultId};

pub mod memory;
pub mod task_result;

pub use memory::InMemoryTaskResultRepository;
pub use task_result::SqlTaskResultRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// Storage for scored submissions. `update` and `delete` report whether a
/// row was touched so callers can tell a missing record from a no-op.
#[async_trait]
pub trait TaskResultRepository: Send + Sync {
    async fn create(&self, result: TaskResult) -> Result<(), RepositoryError>;

    async fn get_by_id(&self, id: &TaskResultId) -> Result<Option<TaskResult>, RepositoryError>;

    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<TaskResult>, RepositoryError>;

    async fn update(&self, result: TaskResult) -> Result<bool, RepositoryError>;

    async fn delete(&self, id: &TaskResultId) -> Result<bool, RepositoryError>;
}
