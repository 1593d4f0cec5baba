//! Scripted gateway double shared by the handler tests. No network I/O;
//! every answer is fixed at construction and every call is recorded.

use std::sync::Mutex;

use async_trait::async_trait;

use chatty_openai::{AssistantGateway, RemoteAssistant, RunOutcome};

pub struct StubGateway {
    pub valid_key: bool,
    pub assistants: Vec<RemoteAssistant>,
    pub assistant_id: Option<String>,
    pub update_ok: bool,
    pub thread_id: Option<String>,
    pub post_ok: bool,
    pub run_outcome: RunOutcome,
    pub transcription: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for StubGateway {
    fn default() -> Self {
        Self {
            valid_key: false,
            assistants: Vec::new(),
            assistant_id: None,
            update_ok: false,
            thread_id: None,
            post_ok: false,
            run_outcome: RunOutcome::Unavailable,
            transcription: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl StubGateway {
    /// A gateway scripted like a fully working provider that replies with
    /// `reply` on every run.
    pub fn configured(reply: &str) -> Self {
        Self {
            valid_key: true,
            assistant_id: Some("asst_stub".to_string()),
            update_ok: true,
            thread_id: Some("thread_stub".to_string()),
            post_ok: true,
            run_outcome: RunOutcome::Completed(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(call.to_string());
    }
}

#[async_trait]
impl AssistantGateway for StubGateway {
    async fn validate_key(&self, _api_key: &str) -> bool {
        self.record("validate_key");
        self.valid_key
    }

    async fn rebuild(&self, _api_key: Option<&str>) {
        self.record("rebuild");
    }

    async fn list_assistants(&self) -> Vec<RemoteAssistant> {
        self.record("list_assistants");
        self.assistants.clone()
    }

    async fn create_assistant(
        &self,
        _name: &str,
        _instructions: &str,
        _model: &str,
    ) -> Option<String> {
        self.record("create_assistant");
        self.assistant_id.clone()
    }

    async fn update_assistant(
        &self,
        _assistant_id: &str,
        _name: &str,
        _instructions: &str,
    ) -> bool {
        self.record("update_assistant");
        self.update_ok
    }

    async fn create_thread(&self) -> Option<String> {
        self.record("create_thread");
        self.thread_id.clone()
    }

    async fn post_message(&self, _thread_id: &str, _content: &str) -> bool {
        self.record("post_message");
        self.post_ok
    }

    async fn run_and_await_reply(&self, _thread_id: &str, _assistant_id: &str) -> RunOutcome {
        self.record("run_and_await_reply");
        self.run_outcome.clone()
    }

    async fn transcribe(&self, _audio: Vec<u8>) -> Option<String> {
        self.record("transcribe");
        self.transcription.clone()
    }
}
