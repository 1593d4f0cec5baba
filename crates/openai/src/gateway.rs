use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::client::{ApiClient, DEFAULT_API_BASE};
use crate::types::{RemoteAssistant, RunOutcome, RunState};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Connection settings for the hosted assistants API.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// How long a run may stay queued or in progress before polling gives up.
    pub run_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_API_BASE.to_string(), run_timeout: Duration::from_secs(60) }
    }
}

/// Facade over the hosted assistants API. Implementations absorb provider
/// failures and hand back sentinel values, so callers never see transport
/// errors; failures are logged here instead.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Probes whether `api_key` can authenticate against the provider.
    async fn validate_key(&self, api_key: &str) -> bool;

    /// Swaps the underlying client for one built from `api_key`, or clears
    /// it when `None`. Requests already in flight keep their old client.
    async fn rebuild(&self, api_key: Option<&str>);

    async fn list_assistants(&self) -> Vec<RemoteAssistant>;

    /// Returns the new assistant's provider id.
    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Option<String>;

    async fn update_assistant(&self, assistant_id: &str, name: &str, instructions: &str) -> bool;

    /// Returns the new thread's provider id.
    async fn create_thread(&self) -> Option<String>;

    async fn post_message(&self, thread_id: &str, content: &str) -> bool;

    /// Starts a run on `thread_id` and polls until it settles or the
    /// configured timeout elapses, then fetches the newest reply text.
    async fn run_and_await_reply(&self, thread_id: &str, assistant_id: &str) -> RunOutcome;

    async fn transcribe(&self, audio: Vec<u8>) -> Option<String>;
}

/// Gateway backed by the real provider. Holds no client until a key is
/// supplied; every method short-circuits to its sentinel in that state.
pub struct OpenAiGateway {
    config: GatewayConfig,
    client: RwLock<Option<ApiClient>>,
}

impl OpenAiGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_key(config, None)
    }

    pub fn with_key(config: GatewayConfig, api_key: Option<&str>) -> Self {
        let client = api_key.and_then(|key| build_client(key, &config.base_url));
        Self { config, client: RwLock::new(client) }
    }

    /// Clones the client out of the lock so no guard is held while a
    /// request (or a long poll) is in flight.
    async fn current_client(&self) -> Option<ApiClient> {
        self.client.read().await.clone()
    }
}

fn build_client(api_key: &str, base_url: &str) -> Option<ApiClient> {
    match ApiClient::new(api_key, base_url) {
        Ok(client) => Some(client),
        Err(error) => {
            warn!(error = %error, "failed to build OpenAI client");
            None
        }
    }
}

#[async_trait]
impl AssistantGateway for OpenAiGateway {
    async fn validate_key(&self, api_key: &str) -> bool {
        let Some(client) = build_client(api_key, &self.config.base_url) else {
            return false;
        };
        match client.list_models().await {
            Ok(_) => true,
            Err(error) => {
                warn!(error = %error, "API key validation failed");
                false
            }
        }
    }

    async fn rebuild(&self, api_key: Option<&str>) {
        let next = api_key.and_then(|key| build_client(key, &self.config.base_url));
        let configured = next.is_some();
        *self.client.write().await = next;
        info!(event_name = "openai.gateway.rebuilt", configured, "OpenAI gateway rebuilt");
    }

    async fn list_assistants(&self) -> Vec<RemoteAssistant> {
        let Some(client) = self.current_client().await else {
            return Vec::new();
        };
        match client.list_assistants().await {
            Ok(assistants) => assistants,
            Err(error) => {
                warn!(error = %error, "failed to list assistants");
                Vec::new()
            }
        }
    }

    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Option<String> {
        let client = self.current_client().await?;
        match client.create_assistant(name, instructions, model).await {
            Ok(assistant) => Some(assistant.id),
            Err(error) => {
                warn!(error = %error, "failed to create assistant");
                None
            }
        }
    }

    async fn update_assistant(&self, assistant_id: &str, name: &str, instructions: &str) -> bool {
        let Some(client) = self.current_client().await else {
            return false;
        };
        match client.update_assistant(assistant_id, name, instructions).await {
            Ok(_) => true,
            Err(error) => {
                warn!(error = %error, assistant_id, "failed to update assistant");
                false
            }
        }
    }

    async fn create_thread(&self) -> Option<String> {
        let client = self.current_client().await?;
        match client.create_thread().await {
            Ok(thread_id) => Some(thread_id),
            Err(error) => {
                warn!(error = %error, "failed to create thread");
                None
            }
        }
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> bool {
        let Some(client) = self.current_client().await else {
            return false;
        };
        match client.create_message(thread_id, content).await {
            Ok(_) => true,
            Err(error) => {
                warn!(error = %error, thread_id, "failed to post message");
                false
            }
        }
    }

    async fn run_and_await_reply(&self, thread_id: &str, assistant_id: &str) -> RunOutcome {
        let Some(client) = self.current_client().await else {
            return RunOutcome::Unavailable;
        };

        let mut run = match client.create_run(thread_id, assistant_id).await {
            Ok(run) => run,
            Err(error) => {
                warn!(error = %error, thread_id, "failed to start run");
                return RunOutcome::Unavailable;
            }
        };

        let deadline = tokio::time::Instant::now() + self.config.run_timeout;
        loop {
            match run.status {
                RunState::Completed => break,
                RunState::Queued | RunState::InProgress => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(thread_id, run_id = %run.id, "run did not settle before the timeout");
                        return RunOutcome::TimedOut;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    run = match client.get_run(thread_id, &run.id).await {
                        Ok(run) => run,
                        Err(error) => {
                            warn!(error = %error, thread_id, "failed to poll run");
                            return RunOutcome::Unavailable;
                        }
                    };
                }
                RunState::Cancelling | RunState::Cancelled => {
                    warn!(thread_id, run_id = %run.id, "run was cancelled");
                    return RunOutcome::Cancelled;
                }
                RunState::Expired => {
                    warn!(thread_id, run_id = %run.id, "run expired");
                    return RunOutcome::Expired;
                }
                RunState::Failed | RunState::RequiresAction | RunState::Incomplete
                | RunState::Unknown => {
                    warn!(
                        thread_id,
                        run_id = %run.id,
                        state = ?run.status,
                        "run finished without a reply"
                    );
                    return RunOutcome::Failed;
                }
            }
        }

        match client.list_messages(thread_id).await {
            Ok(messages) => match messages.first().and_then(|message| message.text()) {
                Some(text) => RunOutcome::Completed(text.to_string()),
                None => RunOutcome::CompletedEmpty,
            },
            Err(error) => {
                warn!(error = %error, thread_id, "failed to fetch run reply");
                RunOutcome::Unavailable
            }
        }
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Option<String> {
        let client = self.current_client().await?;
        match client.transcribe(audio).await {
            Ok(text) => Some(text),
            Err(error) => {
                warn!(error = %error, "audio transcription failed");
                None
            }
        }
    }
}
