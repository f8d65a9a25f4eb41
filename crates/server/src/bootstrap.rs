use std::sync::Arc;

use procure_core::approvals::{ApprovalEngine, EngineSettings};
use procure_core::config::{AppConfig, ConfigError, LoadOptions};
use procure_db::{connection::connect_with_config, migrations, DbPool, SqlApprovalStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<ApprovalEngine<SqlApprovalStore>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

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

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let settings = EngineSettings {
        resolver: config.approvals.resolver,
        urgent_after_days: config.approvals.urgent_after_days,
    };
    let engine = Arc::new(ApprovalEngine::new(SqlApprovalStore::new(db_pool.clone()), settings));
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        resolver = settings.resolver.as_str(),
        urgent_after_days = settings.urgent_after_days,
        "approval engine initialized"
    );

    Ok(Application { config, db_pool, engine })
}
