use std::collections::HashMap;

use tokio::sync::RwLock;

use chatty_core::{Agent, ApiKeyStatus, ChatThread};

use super::{AgentRepository, ApiKeyRepository, RepositoryError, ThreadRepository};

/// Agents keyed by id, with a slug index so lookups and uniqueness checks
/// avoid scanning the whole map.
#[derive(Default)]
struct AgentState {
    by_id: HashMap<String, Agent>,
    slug_index: HashMap<String, String>,
}

#[derive(Default)]
pub struct InMemoryAgentRepository {
    state: RwLock<AgentState>,
}

impl AgentState {
    fn slug_taken(&self, slug: &str, id: &str) -> bool {
        self.slug_index.get(slug).is_some_and(|owner| owner != id)
    }

    fn store(&mut self, agent: &Agent) {
        if let Some(previous) = self.by_id.get(&agent.id) {
            if previous.slug != agent.slug {
                self.slug_index.remove(&previous.slug);
            }
        }
        self.slug_index.insert(agent.slug.clone(), agent.id.clone());
        self.by_id.insert(agent.id.clone(), agent.clone());
    }
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Agent>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.by_id.get(id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Agent>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.slug_index.get(slug).and_then(|id| state.by_id.get(id)).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let state = self.state.read().await;
        let mut all: Vec<Agent> = state.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn insert(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.slug_taken(&agent.slug, &agent.id) {
            return Err(RepositoryError::Conflict(format!(
                "agent slug `{}` is already in use",
                agent.slug
            )));
        }
        state.store(agent);
        Ok(())
    }

    async fn update(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.slug_taken(&agent.slug, &agent.id) {
            return Err(RepositoryError::Conflict(format!(
                "agent slug `{}` is already in use",
                agent.slug
            )));
        }
        state.store(agent);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        match state.by_id.remove(id) {
            Some(agent) => {
                state.slug_index.remove(&agent.slug);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Threads keyed by id, with an (agent slug, session id) index backing the
/// session lookup and the one-thread-per-pair constraint.
#[derive(Default)]
struct ThreadState {
    by_id: HashMap<String, ChatThread>,
    session_index: HashMap<(String, String), String>,
}

#[derive(Default)]
pub struct InMemoryThreadRepository {
    state: RwLock<ThreadState>,
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryThreadRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatThread>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.by_id.get(id).cloned())
    }

    async fn find_by_session(
        &self,
        agent_slug: &str,
        session_id: &str,
    ) -> Result<Option<ChatThread>, RepositoryError> {
        let state = self.state.read().await;
        let key = (agent_slug.to_string(), session_id.to_string());
        Ok(state.session_index.get(&key).and_then(|id| state.by_id.get(id)).cloned())
    }

    async fn insert(&self, thread: &ChatThread) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let key = (thread.agent_slug.clone(), thread.session_id.clone());
        if state.session_index.contains_key(&key) {
            return Err(RepositoryError::Conflict(format!(
                "a thread already exists for agent `{}` and session `{}`",
                thread.agent_slug, thread.session_id
            )));
        }
        state.session_index.insert(key, thread.id.clone());
        state.by_id.insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    async fn update(&self, thread: &ChatThread) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let key = (thread.agent_slug.clone(), thread.session_id.clone());
        state.session_index.insert(key, thread.id.clone());
        state.by_id.insert(thread.id.clone(), thread.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApiKeyRepository {
    status: RwLock<Option<ApiKeyStatus>>,
}

#[async_trait::async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn current(&self) -> Result<Option<ApiKeyStatus>, RepositoryError> {
        let status = self.status.read().await;
        Ok(status.clone())
    }

    async fn replace(&self, status: &ApiKeyStatus) -> Result<(), RepositoryError> {
        let mut stored = self.status.write().await;
        *stored = Some(status.clone());
        Ok(())
    }
}
