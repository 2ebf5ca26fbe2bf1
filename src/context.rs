/// Application context and dependency injection
use crate::{
    children::ChildManager,
    config::ServerConfig,
    db,
    error::{AppError, AppResult},
    rate_limit::RateLimiter,
    records::RecordManager,
    sharing::{AccessGrantManager, RedemptionService, ShareCodeManager, VisibilityResolver},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub children: Arc<ChildManager>,
    // Sharing
    pub share_codes: Arc<ShareCodeManager>,
    pub grants: Arc<AccessGrantManager>,
    pub visibility: Arc<VisibilityResolver>,
    pub redemption: Arc<RedemptionService>,
    pub records: Arc<RecordManager>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..db::DatabaseOptions::default()
        };
        let pool = db::create_pool(&config.storage.database, options).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        tracing::info!(
            database = %config.storage.database.display(),
            revocation_policy = config.sharing.revocation_policy.as_str(),
            "database ready"
        );

        Ok(Self::from_pool(config, pool))
    }

    /// Wire every manager onto an already migrated pool
    pub fn from_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let children = ChildManager::new(pool.clone());
        let grants = AccessGrantManager::new(pool.clone());
        let share_codes = ShareCodeManager::new(pool.clone(), config.sharing.revocation_policy);
        let visibility = VisibilityResolver::new(pool.clone(), children.clone(), grants.clone());
        let redemption = RedemptionService::new(
            share_codes.clone(),
            grants.clone(),
            children.clone(),
            visibility.clone(),
        );
        let records = RecordManager::new(pool.clone(), visibility.clone());
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            config: Arc::new(config),
            db: pool,
            children: Arc::new(children),
            share_codes: Arc::new(share_codes),
            grants: Arc::new(grants),
            visibility: Arc::new(visibility),
            redemption: Arc::new(redemption),
            records: Arc::new(records),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.config.service.hostname, self.config.service.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_context_creates_database_under_data_directory() {
        let dir = tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.storage.data_directory = dir.path().join("data");
        config.storage.database = config.storage.data_directory.join("records.sqlite");

        let ctx = AppContext::new(config).await.unwrap();

        assert!(dir.path().join("data").join("records.sqlite").exists());
        assert!(ctx.children.get("nobody").await.unwrap().is_none());
        ctx.db.close().await;
    }

    #[tokio::test]
    async fn test_context_rejects_invalid_config() {
        let mut config = ServerConfig::default();
        config.service.port = 0;

        assert!(matches!(
            AppContext::new(config).await,
            Err(AppError::Validation(_))
        ));
    }
}
