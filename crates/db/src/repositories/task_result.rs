use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use bandscore_core::domain::task_result::{TaskResult, TaskResultId};

use super::{RepositoryError, TaskResultRepository};
use crate::DbPool;

pub struct SqlTaskResultRepository {
    pool: DbPool,
}

impl SqlTaskResultRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TaskResultRepository for SqlTaskResultRepository {
    async fn create(&self, result: TaskResult) -> Result<(), RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO task_result (id, name, score, comment, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&result.id.0)
        .bind(&result.name)
        .bind(result.score)
        .bind(&result.comment)
        .bind(result.created_at.to_rfc3339())
        .bind(result.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Duplicate(result.id.0))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn get_by_id(&self, id: &TaskResultId) -> Result<Option<TaskResult>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, score, comment, created_at, updated_at
             FROM task_result
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(task_result_from_row).transpose()
    }

    async fn list(&self, skip: u32, limit: u32) -> Result<Vec<TaskResult>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, score, comment, created_at, updated_at
             FROM task_result
             ORDER BY created_at ASC, id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(skip))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(task_result_from_row).collect()
    }

    async fn update(&self, result: TaskResult) -> Result<bool, RepositoryError> {
        let outcome = sqlx::query(
            "UPDATE task_result
             SET name = ?, score = ?, comment = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&result.name)
        .bind(result.score)
        .bind(&result.comment)
        .bind(result.updated_at.to_rfc3339())
        .bind(&result.id.0)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }

    async fn delete(&self, id: &TaskResultId) -> Result<bool, RepositoryError> {
        let outcome = sqlx::query("DELETE FROM task_result WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(outcome.rows_affected() > 0)
    }
}

fn task_result_from_row(row: SqliteRow) -> Result<TaskResult, RepositoryError> {
    Ok(TaskResult {
        id: TaskResultId(row.try_get("id")?),
        name: row.try_get("name")?,
        score: row.try_get("score")?,
        comment: row.try_get("comment")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
