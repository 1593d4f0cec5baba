use serde::{Deserialize, Serialize};

/// Assistant as reported by the hosted provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteAssistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Lifecycle states reported by the runs endpoint. States introduced after
/// this enum was written decode as `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Cancelling,
    Expired,
    RequiresAction,
    Incomplete,
    #[serde(other)]
    Unknown,
}

/// An in-flight or settled run.
#[derive(Clone, Debug, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunState,
}

/// One message on a provider thread. Content arrives as a list of typed
/// parts; only text parts matter here.
#[derive(Clone, Debug, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<MessageText>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageText {
    pub value: String,
}

impl ThreadMessage {
    /// First text part of the message, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| part.text.as_ref().map(|text| text.value.as_str()))
    }
}

/// How a run settled, collapsed to what the relay needs to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Run completed and the newest thread message carried text.
    Completed(String),
    /// Run completed but produced no readable text.
    CompletedEmpty,
    Failed,
    Cancelled,
    Expired,
    /// Run was still queued or in progress when the polling deadline passed.
    TimedOut,
    /// No configured client, or the provider could not be reached.
    Unavailable,
}

impl RunOutcome {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Completed(text) => Some(text),
            _ => None,
        }
    }
}
