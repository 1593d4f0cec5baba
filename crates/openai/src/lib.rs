pub mod client;
pub mod gateway;
pub mod types;

pub use client::{ApiClient, DEFAULT_API_BASE};
pub use gateway::{AssistantGateway, GatewayConfig, OpenAiGateway};
pub use types::{RemoteAssistant, RunOutcome, RunState};
