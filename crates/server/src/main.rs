mod api;
mod bootstrap;
mod chat;
mod health;
#[cfg(test)]
mod test_support;
mod widget;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::trace::TraceLayer;

use chatty_core::config::{AppConfig, LoadOptions};

use crate::bootstrap::Application;

fn init_logging(config: &AppConfig) {
    use chatty_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap(config).await?;
    let router = build_router(&app);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "chatty-server started"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "chatty-server stopping");

    Ok(())
}

fn build_router(app: &Application) -> Router {
    let api_state = api::ApiState {
        agents: app.stores.agents.clone(),
        api_keys: app.stores.api_keys.clone(),
        gateway: app.gateway.clone(),
    };
    let chat_state = chat::ChatState {
        agents: app.stores.agents.clone(),
        threads: app.stores.threads.clone(),
        gateway: app.gateway.clone(),
        locks: Arc::new(chat::SessionLocks::default()),
    };
    let widget_state = widget::WidgetState {
        agents: app.stores.agents.clone(),
        templates: widget::init_templates(),
    };

    Router::new()
        .merge(api::router(api_state))
        .merge(chat::router(chat_state))
        .merge(widget::router(widget_state))
        .merge(health::router(app.db_pool.clone()))
        .layer(TraceLayer::new_for_http())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
