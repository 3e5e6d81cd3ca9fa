use std::collections::HashMap;

use tokio::sync::RwLock;

use bandscore_core::domain::task_result::{TaskResult, TaskResultId};

use super::{RepositoryError, TaskResultRepository};

#[derive(Default)]
pub struct InMemoryTaskResultRepository {
    results: RwLock<HashMap<String, TaskResult>>,
}

#[async_trait::async_trait]
impl TaskResultRepository for InMemoryTaskResultRepository {
    async fn create(&self, result: TaskResult) -> Result<(), RepositoryError> {
        let mut results = self.results.write().await;
        if results.contains_key(&result.id.0) {
            return Err(RepositoryError::Duplicate(result.id.0));
        }
        results.insert(result.id.0.clone(), result);
        Ok(())
    }

    async fn get_by_id(&self, id: &TaskResultId) -> Result<Option<TaskResult>, RepositoryError> {
        let results = self.results.read().await;
        Ok(results.get(&id.0).cloned())
    }

    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<TaskResult>, RepositoryError> {
        let results = self.results.read().await;
        let mut ordered: Vec<TaskResult> = results.values().cloned().collect();
        ordered.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(ordered.into_iter().skip(skip as usize).take(limit as usize).collect())
    }

    async fn update(&self, result: TaskResult) -> Result<bool, RepositoryError> {
        let mut results = self.results.write().await;
        match results.get_mut(&result.id.0) {
            Some(existing) => {
                *existing = result;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &TaskResultId) -> Result<bool, RepositoryError> {
        let mut results = self.results.write().await;
        Ok(results.remove(&id.0).is_some())
    }
}
