//! Embeddable chat widget: serves a self-contained HTML page per agent.
//!
//! `GET /api/widget/{slug}` renders the bubble, popup, and relay script with
//! the appearance parameters baked in. Malformed appearance values fall back
//! to their defaults; only an unknown slug is an error.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use tera::{Context, Tera};
use tracing::{error, warn};

use chatty_core::{
    WidgetPosition, WidgetTheme, DEFAULT_PRIMARY_COLOR, DEFAULT_WELCOME_MESSAGE,
};
use chatty_db::repositories::AgentRepository;

#[derive(Clone)]
pub struct WidgetState {
    pub agents: Arc<dyn AgentRepository>,
    pub templates: Arc<Tera>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetQuery {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub enable_audio: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub welcome_message: Option<String>,
}

pub fn router(state: WidgetState) -> Router {
    Router::new().route("/api/widget/{slug}", get(render_widget)).with_state(state)
}

/// Loads the widget templates, preferring the filesystem so they can be
/// edited without a rebuild, with the embedded copy as fallback.
pub fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/widget/**/*") {
        Ok(tera) => tera,
        Err(error) => {
            warn!(error = %error, "failed to load widget templates from filesystem, using embedded copies");
            Tera::default()
        }
    };

    if tera.get_template_names().all(|name| name != "widget.html") {
        tera.add_raw_template("widget.html", include_str!("../../../templates/widget/widget.html"))
            .ok();
    }

    Arc::new(tera)
}

async fn render_widget(
    State(state): State<WidgetState>,
    Path(slug): Path<String>,
    Query(query): Query<WidgetQuery>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let agent = match state.agents.find_by_slug(&slug).await {
        Ok(agent) => agent,
        Err(error) => {
            error!(error = %error, slug, "record store error while loading widget");
            return Err(internal_error());
        }
    };
    let Some(agent) = agent else {
        return Err((
            StatusCode::NOT_FOUND,
            Html("<html><body><h1>Agent not found</h1></body></html>".to_string()),
        ));
    };

    let theme = query
        .theme
        .as_deref()
        .and_then(WidgetTheme::parse)
        .unwrap_or_default();
    let position = query
        .position
        .as_deref()
        .and_then(WidgetPosition::parse)
        .unwrap_or_default();
    let enable_audio = query
        .enable_audio
        .as_deref()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(true);
    let primary_color = query
        .primary_color
        .as_deref()
        .map(str::trim)
        .filter(|color| !color.is_empty())
        .unwrap_or(DEFAULT_PRIMARY_COLOR);
    let welcome_message = query
        .welcome_message
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .unwrap_or(DEFAULT_WELCOME_MESSAGE);

    let mut context = Context::new();
    context.insert("agent_name", &agent.name);
    context.insert("agent_slug", &agent.slug);
    context.insert("theme", theme.as_str());
    context.insert("side", position.css_side());
    context.insert("enable_audio", &enable_audio);
    context.insert("primary_color", primary_color);
    context.insert("welcome_message", welcome_message);

    let html = state.templates.render("widget.html", &context).map_err(|error| {
        error!(error = %error, slug, "failed to render widget template");
        internal_error()
    })?;

    Ok(Html(html))
}

fn internal_error() -> (StatusCode, Html<String>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<html><body><h1>An internal error occurred</h1></body></html>".to_string()),
    )
}
