pub mod cache;
pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use cache::{CacheError, InMemoryResultCache, ResultCache};
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryTaskResultRepository, RepositoryError, SqlTaskResultRepository, TaskResultRepository,
};
pub use service::{NewTaskResult, StoreError, TaskResultService};
