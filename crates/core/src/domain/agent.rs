use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::new_id;
use crate::errors::DomainError;

/// Provider model used when an agent is created without an explicit one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// One configured assistant persona, addressed by its unique slug.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_assistant_id: Option<String>,
    pub slug: String,
    pub is_active: bool,
    pub files: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Creation payload. Timestamps and ids are stamped here, never by callers.
#[derive(Clone, Debug, Default)]
pub struct NewAgent {
    pub name: String,
    pub description: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub openai_assistant_id: Option<String>,
    pub slug: String,
    pub is_active: Option<bool>,
    pub files: Option<Vec<String>>,
}

/// Partial update; absent fields leave the agent unchanged.
#[derive(Clone, Debug, Default)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    pub openai_assistant_id: Option<String>,
    pub slug: Option<String>,
    pub is_active: Option<bool>,
    pub files: Option<Vec<String>>,
}

impl Agent {
    pub fn create(new: NewAgent) -> Self {
        Self {
            id: new_id(),
            name: new.name,
            description: new.description,
            model: new.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            instructions: new.instructions,
            openai_assistant_id: new.openai_assistant_id,
            slug: new.slug,
            is_active: new.is_active.unwrap_or(true),
            files: new.files.unwrap_or_default(),
            last_updated: Utc::now(),
        }
    }

    /// Merges the update and restamps `last_updated`.
    pub fn apply(&mut self, update: AgentUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(instructions) = update.instructions {
            self.instructions = Some(instructions);
        }
        if let Some(openai_assistant_id) = update.openai_assistant_id {
            self.openai_assistant_id = Some(openai_assistant_id);
        }
        if let Some(slug) = update.slug {
            self.slug = slug;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }
        if let Some(files) = update.files {
            self.files = files;
        }
        self.last_updated = Utc::now();
    }
}

/// Slugs double as URL path segments and conversation partition keys.
pub fn validate_slug(slug: &str) -> Result<(), DomainError> {
    let well_formed = !slug.is_empty()
        && slug.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if well_formed {
        Ok(())
    } else {
        Err(DomainError::InvalidSlug { slug: slug.to_string() })
    }
}
