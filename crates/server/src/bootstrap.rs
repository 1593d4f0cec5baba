use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use chatty_core::config::{AppConfig, StorageBackend};
use chatty_core::ApiKeyStatus;
use chatty_db::repositories::{
    AgentRepository, ApiKeyRepository, InMemoryAgentRepository, InMemoryApiKeyRepository,
    InMemoryThreadRepository, RepositoryError, SqlAgentRepository, SqlApiKeyRepository,
    SqlThreadRepository, ThreadRepository,
};
use chatty_db::{connect_with_settings, migrations, DbPool};
use chatty_openai::{AssistantGateway, GatewayConfig, OpenAiGateway};

/// Record stores behind the abstract contract; the backend was picked once
/// at startup and nothing downstream knows which one it got.
#[derive(Clone)]
pub struct Stores {
    pub agents: Arc<dyn AgentRepository>,
    pub threads: Arc<dyn ThreadRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

pub struct Application {
    pub config: AppConfig,
    /// Present only for the sqlite backend; the health probe uses it.
    pub db_pool: Option<DbPool>,
    pub stores: Stores,
    pub gateway: Arc<dyn AssistantGateway>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("credential bootstrap failed: {0}")]
    KeyStore(#[from] RepositoryError),
}

pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let (db_pool, stores) = match config.storage.backend {
        StorageBackend::Sqlite => {
            let pool = connect_with_settings(
                &config.database.url,
                config.database.max_connections,
                config.database.timeout_secs,
            )
            .await
            .map_err(BootstrapError::DatabaseConnect)?;
            info!(
                event_name = "system.bootstrap.database_connected",
                "database connection established"
            );

            migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
            info!(
                event_name = "system.bootstrap.migrations_applied",
                "database migrations applied"
            );

            let stores = Stores {
                agents: Arc::new(SqlAgentRepository::new(pool.clone())),
                threads: Arc::new(SqlThreadRepository::new(pool.clone())),
                api_keys: Arc::new(SqlApiKeyRepository::new(pool.clone())),
            };
            (Some(pool), stores)
        }
        StorageBackend::Memory => {
            info!(
                event_name = "system.bootstrap.memory_store",
                "using in-process record store; nothing will survive a restart"
            );
            let stores = Stores {
                agents: Arc::new(InMemoryAgentRepository::default()),
                threads: Arc::new(InMemoryThreadRepository::default()),
                api_keys: Arc::new(InMemoryApiKeyRepository::default()),
            };
            (None, stores)
        }
    };

    let gateway = Arc::new(OpenAiGateway::new(GatewayConfig {
        base_url: config.openai.base_url.clone(),
        run_timeout: Duration::from_secs(config.openai.run_timeout_secs),
    }));

    prime_gateway(&config, &stores, gateway.as_ref()).await?;

    Ok(Application { config, db_pool, stores, gateway })
}

/// Gives the gateway a client before the first request. A key already in the
/// store is authoritative; the configured key is only a one-time seed for an
/// empty store.
async fn prime_gateway(
    config: &AppConfig,
    stores: &Stores,
    gateway: &dyn AssistantGateway,
) -> Result<(), BootstrapError> {
    if let Some(stored) = stores.api_keys.current().await? {
        if stored.is_valid {
            gateway.rebuild(Some(&stored.openai_api_key)).await;
            info!(event_name = "system.bootstrap.key_primed", "gateway primed from stored key");
        }
        return Ok(());
    }

    let Some(configured) = &config.openai.api_key else {
        return Ok(());
    };

    let key = configured.expose_secret();
    let is_valid = gateway.validate_key(key).await;
    let status = ApiKeyStatus::record(key, is_valid);
    stores.api_keys.replace(&status).await?;
    if is_valid {
        gateway.rebuild(Some(key)).await;
    }
    info!(
        event_name = "system.bootstrap.key_seeded",
        is_valid, "stored the configured provider key"
    );

    Ok(())
}
