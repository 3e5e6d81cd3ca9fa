use std::sync::Arc;

use bandscore_agent::{AssessmentError, AssessmentRuntime};
use bandscore_core::config::{AppConfig, ConfigError, LoadOptions};
use bandscore_db::{
    connect, migrations, DbPool, InMemoryResultCache, ResultCache, SqlTaskResultRepository,
    TaskResultService,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub assessments: Arc<AssessmentRuntime>,
    pub results: Arc<TaskResultService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
}

#[cfg_attr(not(test), allow(dead_code))]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let assessments = Arc::new(AssessmentRuntime::from_config(&config)?);
    let cache: Option<Arc<dyn ResultCache>> = if config.cache.enabled {
        Some(Arc::new(InMemoryResultCache::default()))
    } else {
        None
    };
    let results = Arc::new(TaskResultService::new(
        Arc::new(SqlTaskResultRepository::new(db_pool.clone())),
        cache,
    ));
    info!(
        event_name = "system.bootstrap.assessments_ready",
        correlation_id = "bootstrap",
        session_mode = config.assessment.session_mode.as_str(),
        strategy = ?config.assessment.strategy,
        cache_enabled = config.cache.enabled,
        "assessment runtime wired"
    );

    Ok(Application { config, db_pool, assessments, results })
}
