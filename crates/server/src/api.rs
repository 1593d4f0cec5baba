//! Admin surface: provider-key storage, agent CRUD, and file-name uploads.
//!
//! Endpoints:
//! - `POST /api/api-key`              — validate and store the provider key
//! - `GET  /api/api-key`              — current key status or `null`
//! - `GET  /api/agents`               — list all agents
//! - `POST /api/agents`               — create an agent (and remote assistant)
//! - `GET  /api/agents/{id}`          — fetch one agent
//! - `PUT  /api/agents/{id}`          — update an agent (and remote assistant)
//! - `DELETE /api/agents/{id}`        — delete the local record
//! - `POST /api/agents/{id}/files`    — append uploaded file names
//! - `GET  /api/openai/assistants`    — list remote assistants

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use chatty_core::{validate_slug, Agent, AgentUpdate, ApiKeyStatus, NewAgent};
use chatty_db::repositories::{AgentRepository, ApiKeyRepository, RepositoryError};
use chatty_openai::{AssistantGateway, RemoteAssistant};

#[derive(Clone)]
pub struct ApiState {
    pub agents: Arc<dyn AgentRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub gateway: Arc<dyn AssistantGateway>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    pub openai_api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/api-key", post(set_api_key).get(get_api_key))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/{id}", get(get_agent).put(update_agent).delete(delete_agent))
        .route("/api/agents/{id}/files", post(upload_agent_files))
        .route("/api/openai/assistants", get(list_remote_assistants))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// API key handlers
// ---------------------------------------------------------------------------

/// Probes the submitted key against the provider, stores the outcome, and
/// swaps the gateway client so the change is visible to the next request.
async fn set_api_key(
    State(state): State<ApiState>,
    Json(body): Json<ApiKeyRequest>,
) -> ApiResult<Json<ApiKeyStatus>> {
    let key = body.openai_api_key.trim();
    if key.is_empty() {
        return Err(bad_request("openaiApiKey is required"));
    }

    let is_valid = state.gateway.validate_key(key).await;
    let status = ApiKeyStatus::record(key, is_valid);
    state.api_keys.replace(&status).await.map_err(db_error)?;

    // An invalid key clears the client rather than leaving a stale one.
    state.gateway.rebuild(is_valid.then_some(key)).await;

    info!(event_name = "admin.api_key.stored", is_valid, "provider key stored");
    Ok(Json(status))
}

async fn get_api_key(State(state): State<ApiState>) -> ApiResult<Json<Option<ApiKeyStatus>>> {
    let status = state.api_keys.current().await.map_err(db_error)?;
    Ok(Json(status))
}

// ---------------------------------------------------------------------------
// Agent handlers
// ---------------------------------------------------------------------------

async fn list_agents(State(state): State<ApiState>) -> ApiResult<Json<Vec<Agent>>> {
    let agents = state.agents.list_all().await.map_err(db_error)?;
    Ok(Json(agents))
}

async fn get_agent(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Agent>> {
    let agent = state.agents.find_by_id(&id).await.map_err(db_error)?;
    agent.map(Json).ok_or_else(|| not_found("Agent not found"))
}

/// Slug uniqueness is checked before the remote assistant is created, so a
/// rejected request never leaves an orphaned assistant at the provider.
async fn create_agent(
    State(state): State<ApiState>,
    Json(body): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(bad_request("name is required"));
    }

    let slug = body.slug.trim().to_string();
    validate_slug(&slug).map_err(|error| bad_request(error.to_string()))?;

    if state.agents.find_by_slug(&slug).await.map_err(db_error)?.is_some() {
        return Err(bad_request(format!("slug `{slug}` already exists")));
    }

    let instructions = body.instructions.filter(|text| !text.trim().is_empty());
    let model = body.model.filter(|text| !text.trim().is_empty());

    let mut openai_assistant_id = None;
    if let Some(instructions) = &instructions {
        let model = model.as_deref().unwrap_or(chatty_core::DEFAULT_MODEL);
        openai_assistant_id = state.gateway.create_assistant(&name, instructions, model).await;
        if openai_assistant_id.is_none() {
            warn!(slug = %slug, "remote assistant was not created; agent stored without one");
        }
    }

    let agent = Agent::create(NewAgent {
        name,
        description: body.description,
        model,
        instructions,
        openai_assistant_id,
        slug: slug.clone(),
        is_active: body.is_active,
        files: None,
    });

    match state.agents.insert(&agent).await {
        Ok(()) => {
            info!(event_name = "admin.agent.created", slug = %slug, agent_id = %agent.id, "agent created");
            Ok((StatusCode::CREATED, Json(agent)))
        }
        Err(RepositoryError::Conflict(message)) => Err(bad_request(message)),
        Err(error) => Err(db_error(error)),
    }
}

async fn update_agent(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAgentRequest>,
) -> ApiResult<Json<Agent>> {
    let Some(mut agent) = state.agents.find_by_id(&id).await.map_err(db_error)? else {
        return Err(not_found("Agent not found"));
    };

    if let Some(slug) = &body.slug {
        let slug = slug.trim();
        validate_slug(slug).map_err(|error| bad_request(error.to_string()))?;
        if slug != agent.slug && state.agents.find_by_slug(slug).await.map_err(db_error)?.is_some()
        {
            return Err(bad_request(format!("slug `{slug}` already exists")));
        }
    }

    let instructions = body.instructions.filter(|text| !text.trim().is_empty());

    // Instruction changes propagate to the remote assistant, best-effort.
    if let (Some(instructions), Some(assistant_id)) = (&instructions, &agent.openai_assistant_id) {
        let name = body.name.as_deref().unwrap_or(&agent.name);
        let updated = state.gateway.update_assistant(assistant_id, name, instructions).await;
        if !updated {
            warn!(agent_id = %id, "remote assistant update did not take effect");
        }
    }

    agent.apply(AgentUpdate {
        name: body.name,
        description: body.description,
        model: body.model,
        instructions,
        openai_assistant_id: None,
        slug: body.slug.map(|slug| slug.trim().to_string()),
        is_active: body.is_active,
        files: None,
    });

    match state.agents.update(&agent).await {
        Ok(()) => {
            info!(event_name = "admin.agent.updated", agent_id = %id, "agent updated");
            Ok(Json(agent))
        }
        Err(RepositoryError::Conflict(message)) => Err(bad_request(message)),
        Err(error) => Err(db_error(error)),
    }
}

async fn delete_agent(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.agents.delete(&id).await.map_err(db_error)?;
    if !deleted {
        return Err(not_found("Agent not found"));
    }

    info!(event_name = "admin.agent.deleted", agent_id = %id, "agent deleted");
    Ok(Json(DeleteResponse { success: true }))
}

/// Stores uploaded file names on the agent. Content is read and discarded;
/// document ingestion is out of scope.
async fn upload_agent_files(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let Some(mut agent) = state.agents.find_by_id(&id).await.map_err(db_error)? else {
        return Err(not_found("Agent not found"));
    };

    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| bad_request("malformed multipart body"))?
    {
        let file_name = field.file_name().map(ToString::to_string);
        let _ = field.bytes().await.map_err(|_| bad_request("malformed multipart body"))?;
        if let Some(file_name) = file_name {
            uploaded.push(file_name);
        }
    }

    let mut files = agent.files.clone();
    files.extend(uploaded.iter().cloned());
    agent.apply(AgentUpdate { files: Some(files), ..AgentUpdate::default() });
    state.agents.update(&agent).await.map_err(db_error)?;

    info!(
        event_name = "admin.agent.files_uploaded",
        agent_id = %id,
        count = uploaded.len(),
        "file names recorded"
    );
    Ok(Json(UploadResponse { files: uploaded }))
}

// ---------------------------------------------------------------------------
// Remote assistant handlers
// ---------------------------------------------------------------------------

async fn list_remote_assistants(State(state): State<ApiState>) -> Json<Vec<RemoteAssistant>> {
    Json(state.gateway.list_assistants().await)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.into() }))
}

pub fn not_found(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (StatusCode::NOT_FOUND, Json(ApiError { error: message.into() }))
}

pub fn db_error(error: RepositoryError) -> (StatusCode, Json<ApiError>) {
    error!(error = %error, "record store error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal error occurred".to_string() }),
    )
}
