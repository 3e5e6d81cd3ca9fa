use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use bandscore_core::domain::task_result::{TaskResult, TaskResultId};
use bandscore_core::{ApplicationError, DomainError};

use crate::cache::{CacheError, ResultCache};
use crate::repositories::{RepositoryError, TaskResultRepository};

const RESULT_KEY_PREFIX: &str = "taskResult:";
const LIST_KEY_PREFIX: &str = "taskResults:";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("task result `{0}` not found")]
    NotFound(String),
    #[error("task result `{0}` already exists")]
    Conflict(String),
    #[error("no updated data")]
    NoUpdatedData,
    #[error("invalid task result: {0}")]
    Invalid(String),
    #[error("task result store failure: {0}")]
    Internal(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Duplicate(id) => Self::Conflict(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for StoreError {
    fn from(DomainError::InvariantViolation(message): DomainError) -> Self {
        Self::Invalid(message)
    }
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(format!("task result `{id}`")),
            StoreError::Conflict(id) => Self::Conflict(format!("task result `{id}` already exists")),
            StoreError::NoUpdatedData => {
                Self::Domain(DomainError::InvariantViolation("no updated data".to_owned()))
            }
            StoreError::Invalid(message) => Self::Domain(DomainError::InvariantViolation(message)),
            StoreError::Internal(message) => Self::Persistence(message),
        }
    }
}

/// Fields a caller supplies when recording a new result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTaskResult {
    pub name: String,
    pub score: f64,
    #[serde(default)]
    pub comment: String,
}

/// Cache-aside access to task results.
///
/// Reads go to the cache first and fill it on a miss. Writes go to the
/// repository, refresh the single-record entry and evict every cached page.
/// Cache faults are logged and never fail the request.
pub struct TaskResultService {
    repository: Arc<dyn TaskResultRepository>,
    cache: Option<Arc<dyn ResultCache>>,
}

impl TaskResultService {
    pub fn new(
        repository: Arc<dyn TaskResultRepository>,
        cache: Option<Arc<dyn ResultCache>>,
    ) -> Self {
        Self { repository, cache }
    }

    pub async fn submit(&self, input: NewTaskResult) -> Result<TaskResult, StoreError> {
        let result = TaskResult::new(input.name.trim(), input.score, input.comment);
        result.validate()?;

        self.repository.create(result.clone()).await?;
        self.cache_put(&result_key(&result.id), &result).await;
        self.invalidate_lists().await;
        Ok(result)
    }

    pub async fn get(&self, id: &TaskResultId) -> Result<TaskResult, StoreError> {
        let key = result_key(id);
        if let Some(result) = self.cache_get::<TaskResult>(&key).await {
            return Ok(result);
        }

        let result = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.0.clone()))?;
        self.cache_put(&key, &result).await;
        Ok(result)
    }

    pub async fn list(&self, skip: u32, limit: u32) -> Result<Vec<TaskResult>, StoreError> {
        let key = format!("{LIST_KEY_PREFIX}{skip}:{limit}");
        if let Some(page) = self.cache_get::<Vec<TaskResult>>(&key).await {
            return Ok(page);
        }

        let page = self.repository.list(skip, limit).await?;
        self.cache_put(&key, &page).await;
        Ok(page)
    }

    /// Renames a result. A blank or unchanged name is `NoUpdatedData`.
    pub async fn update(&self, id: &TaskResultId, name: &str) -> Result<TaskResult, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::NoUpdatedData);
        }

        let mut result = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.0.clone()))?;
        if result.name == name {
            return Err(StoreError::NoUpdatedData);
        }

        result.name = name.to_owned();
        result.updated_at = chrono::Utc::now();
        if !self.repository.update(result.clone()).await? {
            return Err(StoreError::NotFound(id.0.clone()));
        }

        self.cache_put(&result_key(id), &result).await;
        self.invalidate_lists().await;
        Ok(result)
    }

    pub async fn delete(&self, id: &TaskResultId) -> Result<(), StoreError> {
        if !self.repository.delete(id).await? {
            return Err(StoreError::NotFound(id.0.clone()));
        }

        if let Some(cache) = &self.cache {
            if let Err(error) = cache.delete(&result_key(id)).await {
                log_cache_fault("delete", &error);
            }
        }
        self.invalidate_lists().await;
        Ok(())
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(event_name = "store.cache.hit", key, "served from cache");
                    Some(value)
                }
                Err(error) => {
                    log_cache_fault("decode", &CacheError::Encode(error.to_string()));
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                log_cache_fault("get", &error);
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T) {
        let Some(cache) = &self.cache else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(error) => {
                log_cache_fault("encode", &CacheError::Encode(error.to_string()));
                return;
            }
        };
        if let Err(error) = cache.set(key, bytes).await {
            log_cache_fault("set", &error);
        }
    }

    async fn invalidate_lists(&self) {
        if let Some(cache) = &self.cache {
            if let Err(error) = cache.delete_by_prefix(LIST_KEY_PREFIX).await {
                log_cache_fault("invalidate", &error);
            }
        }
    }
}

fn result_key(id: &TaskResultId) -> String {
    format!("{RESULT_KEY_PREFIX}{}", id.0)
}

fn log_cache_fault(operation: &'static str, error: &CacheError) {
    warn!(event_name = "store.cache.fault", operation, error = %error, "cache operation failed");
}
