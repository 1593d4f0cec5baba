//! Conversation relay: the widget-facing message path.
//!
//! Every inbound message resolves the agent, finds or opens the session
//! thread, forwards the text to the hosted assistant, and persists both
//! turns. Provider trouble never surfaces as an error response; the visitor
//! always gets a reply, falling back to a fixed apology when the run fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use chatty_core::{Agent, ChatMessage, ChatThread, NewChatThread};
use chatty_db::repositories::{AgentRepository, RepositoryError, ThreadRepository};
use chatty_openai::{AssistantGateway, RunOutcome};

use crate::api::{bad_request, db_error, not_found, ApiError};

/// Reply used when the assistant run does not produce text.
pub const FALLBACK_RUN_FAILED: &str = "Sorry, I could not process your message.";
/// Reply used when the agent has no remote assistant or no client is configured.
pub const FALLBACK_NOT_CONFIGURED: &str = "This agent is not configured correctly.";

#[derive(Clone)]
pub struct ChatState {
    pub agents: Arc<dyn AgentRepository>,
    pub threads: Arc<dyn ThreadRepository>,
    pub gateway: Arc<dyn AssistantGateway>,
    pub locks: Arc<SessionLocks>,
}

/// One async mutex per live (agent_slug, session_id) pair, so concurrent
/// messages from the same widget session are relayed one at a time and the
/// thread's message order matches arrival order.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    fn acquire(&self, agent_slug: &str, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry((agent_slug.to_string(), session_id.to_string()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
    pub agent_slug: String,
    pub session_id: String,
    /// Base64-encoded audio clip; transcribed into the message text.
    #[serde(default)]
    pub audio_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub message: ChatMessage,
    pub thread: ChatThread,
}

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/chat/message", post(post_message))
        .route("/api/chat/thread/{agent_slug}/{session_id}", get(get_thread))
        .with_state(state)
}

/// Relays one visitor message. The agent is resolved before anything is
/// written, so an unknown slug leaves no thread behind.
async fn post_message(
    State(state): State<ChatState>,
    Json(body): Json<ChatMessageRequest>,
) -> Result<Json<ChatTurnResponse>, (StatusCode, Json<ApiError>)> {
    let agent_slug = body.agent_slug.trim();
    let session_id = body.session_id.trim();
    if agent_slug.is_empty() || session_id.is_empty() {
        return Err(bad_request("agentSlug and sessionId are required"));
    }

    let text = body.content.as_deref().unwrap_or("").trim().to_string();
    if text.is_empty() && body.audio_data.is_none() {
        return Err(bad_request("content or audioData is required"));
    }

    let Some(agent) = state.agents.find_by_slug(agent_slug).await.map_err(db_error)? else {
        return Err(not_found("Agent not found"));
    };

    let session_lock = state.locks.acquire(agent_slug, session_id);
    let _guard = session_lock.lock().await;

    let mut thread = find_or_open_thread(&state, &agent, session_id).await?;

    let user_text = match resolve_user_text(&state, text, body.audio_data).await {
        Some(user_text) => user_text,
        None => return Err(bad_request("audio could not be transcribed")),
    };

    let user_message = ChatMessage::user(user_text.clone());
    thread.append(user_message);

    let reply_text = relay_to_assistant(&state, &agent, &thread, &user_text).await;
    let assistant_message = ChatMessage::assistant(reply_text);
    thread.append(assistant_message.clone());

    state.threads.update(&thread).await.map_err(db_error)?;

    info!(
        event_name = "chat.message.relayed",
        agent_slug,
        thread_id = %thread.id,
        messages = thread.messages.len(),
        "chat turn persisted"
    );
    Ok(Json(ChatTurnResponse { message: assistant_message, thread }))
}

/// Returns the session's thread, opening one if it does not exist. A unique
/// violation on insert means a concurrent request opened it first; re-read
/// and use that one.
async fn find_or_open_thread(
    state: &ChatState,
    agent: &Agent,
    session_id: &str,
) -> Result<ChatThread, (StatusCode, Json<ApiError>)> {
    if let Some(thread) =
        state.threads.find_by_session(&agent.slug, session_id).await.map_err(db_error)?
    {
        return Ok(thread);
    }

    // Best-effort, even before the agent has an assistant: an unconfigured
    // gateway returns `None`, and a remote id captured now lets the session
    // recover once the agent is configured.
    let openai_thread_id = state.gateway.create_thread().await;

    let thread = ChatThread::open(NewChatThread {
        agent_slug: agent.slug.clone(),
        session_id: session_id.to_string(),
        openai_thread_id,
    });

    match state.threads.insert(&thread).await {
        Ok(()) => {
            info!(
                event_name = "chat.thread.opened",
                agent_slug = %agent.slug,
                thread_id = %thread.id,
                "conversation thread opened"
            );
            Ok(thread)
        }
        Err(RepositoryError::Conflict(_)) => {
            let existing =
                state.threads.find_by_session(&agent.slug, session_id).await.map_err(db_error)?;
            existing.ok_or_else(|| {
                db_error(RepositoryError::Decode("thread vanished after conflict".to_string()))
            })
        }
        Err(error) => Err(db_error(error)),
    }
}

/// Decides the text of the user turn. Audio, when present and decodable,
/// replaces typed content; an undecodable clip falls back to the typed text
/// if there is any.
async fn resolve_user_text(
    state: &ChatState,
    typed: String,
    audio_data: Option<String>,
) -> Option<String> {
    let Some(audio_data) = audio_data else {
        return Some(typed);
    };

    let decoded = match base64::engine::general_purpose::STANDARD.decode(audio_data.as_bytes()) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(error = %error, "audio payload was not valid base64");
            return (!typed.is_empty()).then_some(typed);
        }
    };

    match state.gateway.transcribe(decoded).await {
        Some(transcript) if !transcript.trim().is_empty() => Some(transcript),
        _ => {
            warn!("audio transcription produced no text");
            (!typed.is_empty()).then_some(typed)
        }
    }
}

/// Forwards the user turn to the hosted assistant and returns the reply
/// text, or a fixed fallback when the agent is unconfigured or the run does
/// not complete with text.
async fn relay_to_assistant(
    state: &ChatState,
    agent: &Agent,
    thread: &ChatThread,
    user_text: &str,
) -> String {
    let (Some(assistant_id), Some(thread_id)) =
        (&agent.openai_assistant_id, &thread.openai_thread_id)
    else {
        warn!(
            agent_slug = %agent.slug,
            "agent has no remote assistant or thread; returning fallback"
        );
        return FALLBACK_NOT_CONFIGURED.to_string();
    };

    if !state.gateway.post_message(thread_id, user_text).await {
        return FALLBACK_RUN_FAILED.to_string();
    }

    match state.gateway.run_and_await_reply(thread_id, assistant_id).await {
        RunOutcome::Completed(text) => text,
        outcome => {
            warn!(agent_slug = %agent.slug, outcome = ?outcome, "run produced no reply text");
            FALLBACK_RUN_FAILED.to_string()
        }
    }
}

/// Returns the session's thread, or JSON `null` when none exists yet. The
/// widget polls this on load to restore history.
async fn get_thread(
    State(state): State<ChatState>,
    Path((agent_slug, session_id)): Path<(String, String)>,
) -> Result<Json<Option<ChatThread>>, (StatusCode, Json<ApiError>)> {
    let thread =
        state.threads.find_by_session(&agent_slug, &session_id).await.map_err(db_error)?;
    Ok(Json(thread))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::Json;

    use chatty_core::{Agent, AgentUpdate, MessageRole, NewAgent};
    use chatty_db::repositories::{InMemoryAgentRepository, InMemoryThreadRepository};
    use chatty_openai::RunOutcome;

    use crate::test_support::StubGateway;

    use super::{
        get_thread, post_message, ChatMessageRequest, ChatState, SessionLocks,
        FALLBACK_NOT_CONFIGURED, FALLBACK_RUN_FAILED,
    };

    fn state_with(gateway: StubGateway) -> ChatState {
        ChatState {
            agents: Arc::new(InMemoryAgentRepository::default()),
            threads: Arc::new(InMemoryThreadRepository::default()),
            gateway: Arc::new(gateway),
            locks: Arc::new(SessionLocks::default()),
        }
    }

    async fn seed_agent(state: &ChatState, slug: &str, assistant_id: Option<&str>) -> Agent {
        let agent = Agent::create(NewAgent {
            name: "Support".to_string(),
            slug: slug.to_string(),
            openai_assistant_id: assistant_id.map(ToString::to_string),
            ..NewAgent::default()
        });
        state.agents.insert(&agent).await.expect("seed agent");
        agent
    }

    fn request(slug: &str, session: &str, content: &str) -> ChatMessageRequest {
        ChatMessageRequest {
            content: Some(content.to_string()),
            agent_slug: slug.to_string(),
            session_id: session.to_string(),
            audio_data: None,
        }
    }

    #[tokio::test]
    async fn unknown_slug_is_rejected_without_opening_a_thread() {
        let state = state_with(StubGateway::default());

        let (status, _) =
            post_message(State(state.clone()), Json(request("ghost", "session_1", "hi")))
                .await
                .expect_err("unknown slug should 404");

        assert_eq!(status, StatusCode::NOT_FOUND);
        let thread =
            state.threads.find_by_session("ghost", "session_1").await.expect("lookup");
        assert!(thread.is_none());
    }

    #[tokio::test]
    async fn unconfigured_agent_still_persists_both_turns_with_a_fallback_reply() {
        let state = state_with(StubGateway::default());
        seed_agent(&state, "support", None).await;

        let Json(response) =
            post_message(State(state.clone()), Json(request("support", "session_1", "hi")))
                .await
                .expect("relay should succeed");

        assert_eq!(response.message.content, FALLBACK_NOT_CONFIGURED);
        assert_eq!(response.thread.messages.len(), 2);
        assert_eq!(response.thread.messages[0].role, MessageRole::User);
        assert_eq!(response.thread.messages[0].content, "hi");
        assert_eq!(response.thread.messages[1].role, MessageRole::Assistant);

        let stored = state
            .threads
            .find_by_session("support", "session_1")
            .await
            .expect("lookup")
            .expect("thread persisted");
        assert_eq!(stored, response.thread);
    }

    #[tokio::test]
    async fn configured_agent_returns_the_assistant_reply() {
        let state = state_with(StubGateway::configured("Hello from the assistant"));
        seed_agent(&state, "support", Some("asst_stub")).await;

        let Json(response) =
            post_message(State(state), Json(request("support", "session_1", "hi")))
                .await
                .expect("relay should succeed");

        assert_eq!(response.message.content, "Hello from the assistant");
        assert_eq!(response.thread.openai_thread_id.as_deref(), Some("thread_stub"));
    }

    #[tokio::test]
    async fn session_recovers_once_the_agent_gains_an_assistant() {
        let state = state_with(StubGateway::configured("ok"));
        let agent = seed_agent(&state, "support", None).await;

        let Json(first) =
            post_message(State(state.clone()), Json(request("support", "session_1", "hi")))
                .await
                .expect("relay should succeed");

        // The remote thread is opened even before the agent has an assistant.
        assert_eq!(first.message.content, FALLBACK_NOT_CONFIGURED);
        assert_eq!(first.thread.openai_thread_id.as_deref(), Some("thread_stub"));

        let mut configured = agent;
        configured.apply(AgentUpdate {
            openai_assistant_id: Some("asst_stub".to_string()),
            ..AgentUpdate::default()
        });
        state.agents.update(&configured).await.expect("configure agent");

        let Json(second) =
            post_message(State(state), Json(request("support", "session_1", "hello again")))
                .await
                .expect("relay should succeed");

        assert_eq!(second.message.content, "ok");
        assert_eq!(second.thread.messages.len(), 4);
    }

    #[tokio::test]
    async fn failed_run_falls_back_without_erroring() {
        let gateway = StubGateway {
            run_outcome: RunOutcome::Failed,
            ..StubGateway::configured("unused")
        };
        let state = state_with(gateway);
        seed_agent(&state, "support", Some("asst_stub")).await;

        let Json(response) =
            post_message(State(state), Json(request("support", "session_1", "hi")))
                .await
                .expect("relay should succeed");

        assert_eq!(response.message.content, FALLBACK_RUN_FAILED);
    }

    #[tokio::test]
    async fn successive_messages_grow_one_thread_in_order() {
        let state = state_with(StubGateway::configured("ok"));
        seed_agent(&state, "support", Some("asst_stub")).await;

        post_message(State(state.clone()), Json(request("support", "session_1", "first")))
            .await
            .expect("first turn");
        let Json(response) =
            post_message(State(state.clone()), Json(request("support", "session_1", "second")))
                .await
                .expect("second turn");

        assert_eq!(response.thread.messages.len(), 4);
        let contents: Vec<&str> =
            response.thread.messages.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "ok", "second", "ok"]);
    }

    #[tokio::test]
    async fn concurrent_messages_serialize_into_one_alternating_thread() {
        let state = state_with(StubGateway::configured("ok"));
        seed_agent(&state, "support", Some("asst_stub")).await;

        let mut handles = Vec::new();
        for n in 0..8 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                post_message(
                    State(state),
                    Json(request("support", "session_1", &format!("turn {n}"))),
                )
                .await
                .expect("relay should succeed");
            }));
        }
        for handle in handles {
            handle.await.expect("task completes");
        }

        let thread = state
            .threads
            .find_by_session("support", "session_1")
            .await
            .expect("lookup")
            .expect("thread exists");

        // No lost appends, strict user/assistant alternation.
        assert_eq!(thread.messages.len(), 16);
        let mut user_turns = Vec::new();
        for pair in thread.messages.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
            assert_eq!(pair[1].content, "ok");
            user_turns.push(pair[0].content.clone());
        }
        user_turns.sort();
        let mut expected: Vec<String> = (0..8).map(|n| format!("turn {n}")).collect();
        expected.sort();
        assert_eq!(user_turns, expected);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_agent_and_session_id() {
        let state = state_with(StubGateway::configured("ok"));
        seed_agent(&state, "support", Some("asst_stub")).await;
        seed_agent(&state, "sales", Some("asst_stub")).await;

        post_message(State(state.clone()), Json(request("support", "session_1", "hi")))
            .await
            .expect("support turn");
        post_message(State(state.clone()), Json(request("sales", "session_1", "hi")))
            .await
            .expect("sales turn");
        post_message(State(state.clone()), Json(request("support", "session_2", "hi")))
            .await
            .expect("second session turn");

        for (slug, session) in
            [("support", "session_1"), ("sales", "session_1"), ("support", "session_2")]
        {
            let thread = state
                .threads
                .find_by_session(slug, session)
                .await
                .expect("lookup")
                .expect("thread exists");
            assert_eq!(thread.messages.len(), 2);
        }
    }

    #[tokio::test]
    async fn audio_payload_is_transcribed_into_the_user_turn() {
        use base64::Engine;

        let gateway = StubGateway {
            transcription: Some("spoken words".to_string()),
            ..StubGateway::configured("heard you")
        };
        let state = state_with(gateway);
        seed_agent(&state, "support", Some("asst_stub")).await;

        let audio = base64::engine::general_purpose::STANDARD.encode(b"fake-wav-bytes");
        let body = ChatMessageRequest {
            content: None,
            agent_slug: "support".to_string(),
            session_id: "session_1".to_string(),
            audio_data: Some(audio),
        };
        let Json(response) =
            post_message(State(state), Json(body)).await.expect("relay should succeed");

        assert_eq!(response.thread.messages[0].content, "spoken words");
        assert_eq!(response.message.content, "heard you");
    }

    #[tokio::test]
    async fn undecodable_audio_without_text_is_rejected() {
        let state = state_with(StubGateway::configured("unused"));
        seed_agent(&state, "support", Some("asst_stub")).await;

        let body = ChatMessageRequest {
            content: None,
            agent_slug: "support".to_string(),
            session_id: "session_1".to_string(),
            audio_data: Some("%%%not-base64%%%".to_string()),
        };
        let (status, _) =
            post_message(State(state), Json(body)).await.expect_err("should be rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_identifiers_are_rejected() {
        let state = state_with(StubGateway::default());

        let (status, _) = post_message(State(state), Json(request("", "session_1", "hi")))
            .await
            .expect_err("blank slug should be rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_thread_returns_null_until_the_first_message() {
        let state = state_with(StubGateway::configured("ok"));
        seed_agent(&state, "support", Some("asst_stub")).await;

        let Json(missing) = get_thread(
            State(state.clone()),
            Path(("support".to_string(), "session_1".to_string())),
        )
        .await
        .expect("lookup succeeds");
        assert!(missing.is_none());

        post_message(State(state.clone()), Json(request("support", "session_1", "hi")))
            .await
            .expect("relay");

        let Json(found) = get_thread(
            State(state.clone()),
            Path(("support".to_string(), "session_1".to_string())),
        )
        .await
        .expect("lookup succeeds");
        let found = found.expect("thread exists");
        assert_eq!(found.messages.len(), 2);

        let Json(again) = get_thread(
            State(state),
            Path(("support".to_string(), "session_1".to_string())),
        )
        .await
        .expect("repeat lookup succeeds");
        assert_eq!(again, Some(found));
    }
}
