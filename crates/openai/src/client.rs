use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart;
use serde::{Deserialize, Serialize};

use crate::types::{RemoteAssistant, Run, ThreadMessage};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Thin HTTP client for the hosted assistants API (no SDK). One instance
/// per credential; the gateway rebuilds it when the key changes.
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("openai-beta"),
            HeaderValue::from_static("assistants=v2"),
        );

        let mut auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .context("invalid API key format")?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self { http_client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Cheapest authenticated call there is; used to probe whether a key works.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .context("failed to send request")?;
        let envelope: ListEnvelope<ModelEntry> = read_json(response).await?;
        Ok(envelope.data.into_iter().map(|entry| entry.id).collect())
    }

    pub async fn list_assistants(&self) -> Result<Vec<RemoteAssistant>> {
        let response = self
            .http_client
            .get(format!("{}/assistants?limit=100", self.base_url))
            .send()
            .await
            .context("failed to send request")?;
        let envelope: ListEnvelope<RemoteAssistant> = read_json(response).await?;
        Ok(envelope.data)
    }

    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Result<RemoteAssistant> {
        let response = self
            .http_client
            .post(format!("{}/assistants", self.base_url))
            .json(&CreateAssistantPayload { name, instructions, model })
            .send()
            .await
            .context("failed to send request")?;
        read_json(response).await
    }

    pub async fn update_assistant(
        &self,
        assistant_id: &str,
        name: &str,
        instructions: &str,
    ) -> Result<RemoteAssistant> {
        let response = self
            .http_client
            .post(format!("{}/assistants/{assistant_id}", self.base_url))
            .json(&UpdateAssistantPayload { name, instructions })
            .send()
            .await
            .context("failed to send request")?;
        read_json(response).await
    }

    pub async fn create_thread(&self) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/threads", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("failed to send request")?;
        let created: ObjectCreated = read_json(response).await?;
        Ok(created.id)
    }

    pub async fn create_message(&self, thread_id: &str, content: &str) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/threads/{thread_id}/messages", self.base_url))
            .json(&CreateMessagePayload { role: "user", content })
            .send()
            .await
            .context("failed to send request")?;
        let created: ObjectCreated = read_json(response).await?;
        Ok(created.id)
    }

    pub async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let response = self
            .http_client
            .post(format!("{}/threads/{thread_id}/runs", self.base_url))
            .json(&CreateRunPayload { assistant_id })
            .send()
            .await
            .context("failed to send request")?;
        read_json(response).await
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let response = self
            .http_client
            .get(format!("{}/threads/{thread_id}/runs/{run_id}", self.base_url))
            .send()
            .await
            .context("failed to send request")?;
        read_json(response).await
    }

    /// Messages on a thread, newest first.
    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let response = self
            .http_client
            .get(format!("{}/threads/{thread_id}/messages", self.base_url))
            .send()
            .await
            .context("failed to send request")?;
        let envelope: ListEnvelope<ThreadMessage> = read_json(response).await?;
        Ok(envelope.data)
    }

    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let file_part = multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .context("invalid audio mime type")?;
        let form = multipart::Form::new().part("file", file_part).text("model", "whisper-1");

        let response = self
            .http_client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("failed to send request")?;
        let transcription: Transcription = read_json(response).await?;
        Ok(transcription.text)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
    }

    response.json().await.context("failed to parse response")
}

#[derive(Debug, Serialize)]
struct CreateAssistantPayload<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateAssistantPayload<'a> {
    name: &'a str,
    instructions: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateMessagePayload<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunPayload<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ObjectCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    text: String,
}
