use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::PromptFormat;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub directline: DirectLineConfig,
    pub assessment: AssessmentConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DirectLineConfig {
    pub base_url: String,
    pub token: SecretString,
    pub default_session_id: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AssessmentConfig {
    pub session_mode: SessionMode,
    pub strategy: CorrelationStrategy,
    pub prompt_format: PromptFormat,
    pub sender_id: String,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: Option<u32>,
    pub deadline_secs: Option<u64>,
    pub max_concurrent_runs: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How a conversation is acquired for each assessment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Exchange the secret and open a fresh conversation per run.
    Open,
    /// Post into the pre-established `directline.default_session_id`.
    Reuse,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Reuse => "reuse",
        }
    }
}

/// How a polled activity is recognised as the reply to the message in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrategy {
    MostRecent,
    ReplyTo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub directline_base_url: Option<String>,
    pub directline_token: Option<String>,
    pub default_session_id: Option<String>,
    pub session_mode: Option<SessionMode>,
    pub strategy: Option<CorrelationStrategy>,
    pub prompt_format: Option<PromptFormat>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub deadline_secs: Option<u64>,
    pub cache_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://bandscore.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            directline: DirectLineConfig {
                base_url: "https://directline.botframework.com/v3/directline".to_string(),
                token: String::new().into(),
                default_session_id: None,
                request_timeout_secs: 30,
            },
            assessment: AssessmentConfig {
                session_mode: SessionMode::Open,
                strategy: CorrelationStrategy::MostRecent,
                prompt_format: PromptFormat::Outline,
                sender_id: "bandscore".to_string(),
                initial_delay_ms: 1_000,
                max_delay_ms: 30_000,
                max_attempts: None,
                deadline_secs: Some(300),
                max_concurrent_runs: 8,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            cache: CacheConfig { enabled: true },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SessionMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "reuse" => Ok(Self::Reuse),
            other => Err(ConfigError::Validation(format!(
                "unsupported session mode `{other}` (expected open|reuse)"
            ))),
        }
    }
}

impl std::str::FromStr for CorrelationStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "most_recent" | "most-recent" => Ok(Self::MostRecent),
            "reply_to" | "reply-to" => Ok(Self::ReplyTo),
            other => Err(ConfigError::Validation(format!(
                "unsupported correlation strategy `{other}` (expected most_recent|reply_to)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("bandscore.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(directline) = patch.directline {
            if let Some(base_url) = directline.base_url {
                self.directline.base_url = base_url;
            }
            if let Some(directline_token_value) = directline.token {
                self.directline.token = secret_value(directline_token_value);
            }
            if let Some(default_session_id) = directline.default_session_id {
                self.directline.default_session_id = Some(default_session_id);
            }
            if let Some(request_timeout_secs) = directline.request_timeout_secs {
                self.directline.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(assessment) = patch.assessment {
            if let Some(session_mode) = assessment.session_mode {
                self.assessment.session_mode = session_mode;
            }
            if let Some(strategy) = assessment.strategy {
                self.assessment.strategy = strategy;
            }
            if let Some(prompt_format) = assessment.prompt_format {
                self.assessment.prompt_format = prompt_format;
            }
            if let Some(sender_id) = assessment.sender_id {
                self.assessment.sender_id = sender_id;
            }
            if let Some(initial_delay_ms) = assessment.initial_delay_ms {
                self.assessment.initial_delay_ms = initial_delay_ms;
            }
            if let Some(max_delay_ms) = assessment.max_delay_ms {
                self.assessment.max_delay_ms = max_delay_ms;
            }
            if let Some(max_attempts) = assessment.max_attempts {
                self.assessment.max_attempts = Some(max_attempts);
            }
            if let Some(deadline_secs) = assessment.deadline_secs {
                self.assessment.deadline_secs = Some(deadline_secs);
            }
            if let Some(max_concurrent_runs) = assessment.max_concurrent_runs {
                self.assessment.max_concurrent_runs = max_concurrent_runs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BANDSCORE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BANDSCORE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BANDSCORE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BANDSCORE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BANDSCORE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BANDSCORE_DIRECTLINE_BASE_URL") {
            self.directline.base_url = value;
        }
        let token =
            read_env("BANDSCORE_DIRECTLINE_TOKEN").or_else(|| read_env("COPILOT_TOKEN"));
        if let Some(value) = token {
            self.directline.token = secret_value(value);
        }
        let default_session_id = read_env("BANDSCORE_DIRECTLINE_DEFAULT_SESSION_ID")
            .or_else(|| read_env("COPILOT_CONVERSATION_ID"));
        if let Some(value) = default_session_id {
            self.directline.default_session_id = Some(value);
        }
        if let Some(value) = read_env("BANDSCORE_DIRECTLINE_REQUEST_TIMEOUT_SECS") {
            self.directline.request_timeout_secs =
                parse_u64("BANDSCORE_DIRECTLINE_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_SESSION_MODE") {
            self.assessment.session_mode = value.parse()?;
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_STRATEGY") {
            self.assessment.strategy = value.parse()?;
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_PROMPT_FORMAT") {
            self.assessment.prompt_format = value.parse().map_err(ConfigError::Validation)?;
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_SENDER_ID") {
            self.assessment.sender_id = value;
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_INITIAL_DELAY_MS") {
            self.assessment.initial_delay_ms =
                parse_u64("BANDSCORE_ASSESSMENT_INITIAL_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_MAX_DELAY_MS") {
            self.assessment.max_delay_ms = parse_u64("BANDSCORE_ASSESSMENT_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_MAX_ATTEMPTS") {
            self.assessment.max_attempts =
                Some(parse_u32("BANDSCORE_ASSESSMENT_MAX_ATTEMPTS", &value)?);
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_DEADLINE_SECS") {
            self.assessment.deadline_secs =
                Some(parse_u64("BANDSCORE_ASSESSMENT_DEADLINE_SECS", &value)?);
        }
        if let Some(value) = read_env("BANDSCORE_ASSESSMENT_MAX_CONCURRENT_RUNS") {
            self.assessment.max_concurrent_runs =
                parse_u32("BANDSCORE_ASSESSMENT_MAX_CONCURRENT_RUNS", &value)? as usize;
        }

        if let Some(value) = read_env("BANDSCORE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("BANDSCORE_SERVER_PORT") {
            self.server.port = parse_u16("BANDSCORE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("BANDSCORE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("BANDSCORE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("BANDSCORE_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("BANDSCORE_CACHE_ENABLED", &value)?;
        }

        let log_level =
            read_env("BANDSCORE_LOGGING_LEVEL").or_else(|| read_env("BANDSCORE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BANDSCORE_LOGGING_FORMAT").or_else(|| read_env("BANDSCORE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(base_url) = overrides.directline_base_url {
            self.directline.base_url = base_url;
        }
        if let Some(directline_token) = overrides.directline_token {
            self.directline.token = secret_value(directline_token);
        }
        if let Some(default_session_id) = overrides.default_session_id {
            self.directline.default_session_id = Some(default_session_id);
        }
        if let Some(session_mode) = overrides.session_mode {
            self.assessment.session_mode = session_mode;
        }
        if let Some(strategy) = overrides.strategy {
            self.assessment.strategy = strategy;
        }
        if let Some(prompt_format) = overrides.prompt_format {
            self.assessment.prompt_format = prompt_format;
        }
        if let Some(initial_delay_ms) = overrides.initial_delay_ms {
            self.assessment.initial_delay_ms = initial_delay_ms;
        }
        if let Some(max_delay_ms) = overrides.max_delay_ms {
            self.assessment.max_delay_ms = max_delay_ms;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.assessment.max_attempts = Some(max_attempts);
        }
        if let Some(deadline_secs) = overrides.deadline_secs {
            self.assessment.deadline_secs = Some(deadline_secs);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_directline(&self.directline)?;
        validate_assessment(&self.assessment, &self.directline)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("bandscore.toml"), PathBuf::from("config/bandscore.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_directline(directline: &DirectLineConfig) -> Result<(), ConfigError> {
    let base_url = directline.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "directline.base_url must start with http:// or https://".to_string(),
        ));
    }

    if directline.token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "directline.token is required. Copy the Direct Line secret from the bot's channel settings (or set COPILOT_TOKEN)".to_string(),
        ));
    }

    if directline.request_timeout_secs == 0 || directline.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "directline.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_assessment(
    assessment: &AssessmentConfig,
    directline: &DirectLineConfig,
) -> Result<(), ConfigError> {
    if assessment.session_mode == SessionMode::Reuse {
        let missing = directline
            .default_session_id
            .as_ref()
            .map(|value| value.trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "assessment.session_mode = reuse requires directline.default_session_id"
                    .to_string(),
            ));
        }
    }

    if assessment.sender_id.trim().is_empty() {
        return Err(ConfigError::Validation("assessment.sender_id must not be empty".to_string()));
    }

    if assessment.initial_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "assessment.initial_delay_ms must be greater than zero".to_string(),
        ));
    }

    if assessment.max_delay_ms < assessment.initial_delay_ms {
        return Err(ConfigError::Validation(
            "assessment.max_delay_ms must be at least assessment.initial_delay_ms".to_string(),
        ));
    }

    if assessment.max_attempts == Some(0) {
        return Err(ConfigError::Validation(
            "assessment.max_attempts must be greater than zero when set".to_string(),
        ));
    }

    if assessment.deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "assessment.deadline_secs must be greater than zero when set".to_string(),
        ));
    }

    if assessment.max_concurrent_runs == 0 {
        return Err(ConfigError::Validation(
            "assessment.max_concurrent_runs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => other.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    directline: Option<DirectLinePatch>,
    assessment: Option<AssessmentPatch>,
    server: Option<ServerPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectLinePatch {
    base_url: Option<String>,
    token: Option<String>,
    default_session_id: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssessmentPatch {
    session_mode: Option<SessionMode>,
    strategy: Option<CorrelationStrategy>,
    prompt_format: Option<PromptFormat>,
    sender_id: Option<String>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    deadline_secs: Option<u64>,
    max_concurrent_runs: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, CorrelationStrategy, LoadOptions, LogFormat,
        SessionMode,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TOUCHED_VARS: &[&str] = &[
        "BANDSCORE_DIRECTLINE_TOKEN",
        "BANDSCORE_DATABASE_URL",
        "BANDSCORE_LOG_LEVEL",
        "BANDSCORE_LOG_FORMAT",
        "BANDSCORE_ASSESSMENT_STRATEGY",
        "COPILOT_TOKEN",
        "COPILOT_CONVERSATION_ID",
        "TEST_DIRECTLINE_SECRET",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars() {
        for var in TOUCHED_VARS {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("TEST_DIRECTLINE_SECRET", "secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bandscore.toml");
            fs::write(
                &path,
                r#"
[directline]
token = "${TEST_DIRECTLINE_SECRET}"

[assessment]
strategy = "reply_to"
max_attempts = 12
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.directline.token.expose_secret() == "secret-from-env",
                "token should be interpolated from environment",
            )?;
            ensure(
                config.assessment.strategy == CorrelationStrategy::ReplyTo,
                "strategy should come from file",
            )?;
            ensure(config.assessment.max_attempts == Some(12), "max attempts should come from file")
        })();

        clear_vars();
        result
    }

    #[test]
    fn legacy_copilot_variables_are_accepted() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("COPILOT_TOKEN", "legacy-secret");
        env::set_var("COPILOT_CONVERSATION_ID", "conv-legacy");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    session_mode: Some(SessionMode::Reuse),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.directline.token.expose_secret() == "legacy-secret",
                "COPILOT_TOKEN should populate the direct line token",
            )?;
            ensure(
                config.directline.default_session_id.as_deref() == Some("conv-legacy"),
                "COPILOT_CONVERSATION_ID should populate the default session",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("BANDSCORE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BANDSCORE_DIRECTLINE_TOKEN", "secret-from-env");
        env::set_var("BANDSCORE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("bandscore.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[directline]
token = "secret-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "env log format should win")?;
            ensure(
                config.directline.token.expose_secret() == "secret-from-env",
                "env token should win over file and defaults",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn missing_token_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".into()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("directline.token")
        );
        ensure(has_message, "validation failure should mention directline.token")
    }

    #[test]
    fn reuse_mode_requires_default_session() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                directline_token: Some("secret".to_string()),
                session_mode: Some(SessionMode::Reuse),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("default_session_id")
            ),
            "reuse without a default session should be rejected",
        )
    }

    #[test]
    fn backoff_bounds_are_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let inverted = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                directline_token: Some("secret".to_string()),
                initial_delay_ms: Some(5_000),
                max_delay_ms: Some(1_000),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(inverted.is_err(), "max delay below initial delay should be rejected")?;

        let zero_attempts = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                directline_token: Some("secret".to_string()),
                max_attempts: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        ensure(zero_attempts.is_err(), "zero max attempts should be rejected")
    }

    #[test]
    fn invalid_strategy_env_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("BANDSCORE_DIRECTLINE_TOKEN", "secret");
        env::set_var("BANDSCORE_ASSESSMENT_STRATEGY", "first_seen");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars();

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("first_seen")
            ),
            "unknown strategy should be named in the error",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        env::set_var("BANDSCORE_DIRECTLINE_TOKEN", "dl-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("dl-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.assessment.deadline_secs == Some(300), "default deadline is bounded")
        })();

        clear_vars();
        result
    }
}
