use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chatty_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let mut push = |key_path: &str, value: &str, env_key: &str| {
        lines.push(render_line(
            key_path,
            value,
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    };

    push(
        "storage.backend",
        &format!("{:?}", config.storage.backend).to_lowercase(),
        "CHATTY_STORAGE_BACKEND",
    );

    push("database.url", &config.database.url, "CHATTY_DATABASE_URL");
    push(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        "CHATTY_DATABASE_MAX_CONNECTIONS",
    );
    push(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        "CHATTY_DATABASE_TIMEOUT_SECS",
    );

    let api_key = if config.openai.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push("openai.api_key", api_key, "CHATTY_OPENAI_API_KEY");
    push("openai.base_url", &config.openai.base_url, "CHATTY_OPENAI_BASE_URL");
    push(
        "openai.run_timeout_secs",
        &config.openai.run_timeout_secs.to_string(),
        "CHATTY_OPENAI_RUN_TIMEOUT_SECS",
    );

    push("server.bind_address", &config.server.bind_address, "CHATTY_SERVER_BIND_ADDRESS");
    push("server.port", &config.server.port.to_string(), "CHATTY_SERVER_PORT");

    push("logging.level", &config.logging.level, "CHATTY_LOGGING_LEVEL");
    push("logging.format", &format!("{:?}", config.logging.format), "CHATTY_LOGGING_FORMAT");

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("chatty.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/chatty.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
