use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::new_id;

/// Singleton provider credential. The key is held in clear text and echoed
/// back by the admin API; a known gap carried over from the original design.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStatus {
    pub id: String,
    pub openai_api_key: String,
    pub is_valid: bool,
    pub last_validated: DateTime<Utc>,
}

impl ApiKeyStatus {
    /// Records the outcome of a validation probe for a freshly submitted key.
    pub fn record(openai_api_key: impl Into<String>, is_valid: bool) -> Self {
        Self {
            id: new_id(),
            openai_api_key: openai_api_key.into(),
            is_valid,
            last_validated: Utc::now(),
        }
    }
}
