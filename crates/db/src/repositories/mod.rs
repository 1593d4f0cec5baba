use async_trait::async_trait;
use thiserror::Error;

use chatty_core::{Agent, ApiKeyStatus, ChatThread};

pub mod agent;
pub mod api_key;
pub mod memory;
pub mod thread;

pub use agent::SqlAgentRepository;
pub use api_key::SqlApiKeyRepository;
pub use memory::{InMemoryAgentRepository, InMemoryApiKeyRepository, InMemoryThreadRepository};
pub use thread::SqlThreadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Agent>, RepositoryError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Agent>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError>;
    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError>;
    async fn update(&self, agent: &Agent) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatThread>, RepositoryError>;

    async fn find_by_session(
        &self,
        agent_slug: &str,
        session_id: &str,
    ) -> Result<Option<ChatThread>, RepositoryError>;

    async fn insert(&self, thread: &ChatThread) -> Result<(), RepositoryError>;

    async fn update(&self, thread: &ChatThread) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn current(&self) -> Result<Option<ApiKeyStatus>, RepositoryError>;
    async fn replace(&self, status: &ApiKeyStatus) -> Result<(), RepositoryError>;
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}
