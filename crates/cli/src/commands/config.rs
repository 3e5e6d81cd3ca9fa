use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bandscore_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct FieldReport {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source_of = |key: &str, env_keys: &[&str]| {
        field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let directline = &config.directline;
    let assessment = &config.assessment;
    let mut fields: Vec<FieldReport> = Vec::new();
    let mut row = |key: &'static str, value: String, env_keys: &[&str]| {
        fields.push(FieldReport { key, value, source: source_of(key, env_keys) });
    };

    row("database.url", config.database.url.clone(), &["BANDSCORE_DATABASE_URL"]);
    row(
        "database.max_connections",
        config.database.max_connections.to_string(),
        &["BANDSCORE_DATABASE_MAX_CONNECTIONS"],
    );
    row(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        &["BANDSCORE_DATABASE_TIMEOUT_SECS"],
    );
    row("directline.base_url", directline.base_url.clone(), &["BANDSCORE_DIRECTLINE_BASE_URL"]);
    row(
        "directline.token",
        redact_token(directline.token.expose_secret()),
        &["BANDSCORE_DIRECTLINE_TOKEN", "COPILOT_TOKEN"],
    );
    row(
        "directline.default_session_id",
        directline.default_session_id.clone().unwrap_or_else(|| "<unset>".to_string()),
        &["BANDSCORE_DIRECTLINE_DEFAULT_SESSION_ID", "COPILOT_CONVERSATION_ID"],
    );
    row(
        "directline.request_timeout_secs",
        directline.request_timeout_secs.to_string(),
        &["BANDSCORE_DIRECTLINE_REQUEST_TIMEOUT_SECS"],
    );
    row(
        "assessment.session_mode",
        assessment.session_mode.as_str().to_string(),
        &["BANDSCORE_ASSESSMENT_SESSION_MODE"],
    );
    row("assessment.strategy", label(&assessment.strategy), &["BANDSCORE_ASSESSMENT_STRATEGY"]);
    row(
        "assessment.prompt_format",
        label(&assessment.prompt_format),
        &["BANDSCORE_ASSESSMENT_PROMPT_FORMAT"],
    );
    row("assessment.sender_id", assessment.sender_id.clone(), &["BANDSCORE_ASSESSMENT_SENDER_ID"]);
    row(
        "assessment.initial_delay_ms",
        assessment.initial_delay_ms.to_string(),
        &["BANDSCORE_ASSESSMENT_INITIAL_DELAY_MS"],
    );
    row(
        "assessment.max_delay_ms",
        assessment.max_delay_ms.to_string(),
        &["BANDSCORE_ASSESSMENT_MAX_DELAY_MS"],
    );
    row(
        "assessment.max_attempts",
        optional(assessment.max_attempts),
        &["BANDSCORE_ASSESSMENT_MAX_ATTEMPTS"],
    );
    row(
        "assessment.deadline_secs",
        optional(assessment.deadline_secs),
        &["BANDSCORE_ASSESSMENT_DEADLINE_SECS"],
    );
    row(
        "assessment.max_concurrent_runs",
        assessment.max_concurrent_runs.to_string(),
        &["BANDSCORE_ASSESSMENT_MAX_CONCURRENT_RUNS"],
    );
    row("cache.enabled", config.cache.enabled.to_string(), &["BANDSCORE_CACHE_ENABLED"]);
    row(
        "server.bind_address",
        config.server.bind_address.clone(),
        &["BANDSCORE_SERVER_BIND_ADDRESS"],
    );
    row("server.port", config.server.port.to_string(), &["BANDSCORE_SERVER_PORT"]);
    row(
        "server.graceful_shutdown_secs",
        config.server.graceful_shutdown_secs.to_string(),
        &["BANDSCORE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    );
    row(
        "logging.level",
        config.logging.level.clone(),
        &["BANDSCORE_LOGGING_LEVEL", "BANDSCORE_LOG_LEVEL"],
    );
    row(
        "logging.format",
        label(&config.logging.format),
        &["BANDSCORE_LOGGING_FORMAT", "BANDSCORE_LOG_FORMAT"],
    );

    CommandResult::success_with_details(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(json!({
            "config_file": config_file_path.map(|path| path.display().to_string()),
            "fields": fields,
        })),
    )
}

fn detect_config_path() -> Option<PathBuf> {
    ["bandscore.toml", "config/bandscore.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

/// Serialized form of a config enum, e.g. `most_recent`.
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => text,
        Ok(other) => other.to_string(),
        Err(_) => "<unrenderable>".to_string(),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "<unbounded>".to_string())
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Direct Line secrets are opaque; only the length is worth showing.
    format!("<redacted:{} chars>", trimmed.chars().count())
}
