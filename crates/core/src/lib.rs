pub mod config;
pub mod domain;
pub mod errors;

pub use chrono;

pub use domain::agent::{validate_slug, Agent, AgentUpdate, NewAgent, DEFAULT_MODEL};
pub use domain::api_key::ApiKeyStatus;
pub use domain::thread::{ChatMessage, ChatThread, MessageRole, NewChatThread};
pub use domain::widget::{
    WidgetPosition, WidgetTheme, DEFAULT_PRIMARY_COLOR, DEFAULT_WELCOME_MESSAGE,
};
pub use errors::DomainError;
