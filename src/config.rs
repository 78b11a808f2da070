use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while assembling [`Config`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or blank.
    #[error("environment variable {0} is required")]
    MissingVariable(String),
    /// An environment variable holds a value that does not parse.
    #[error("environment variable {0} has an unparsable value")]
    InvalidValue(String),
}

/// Runtime configuration for the docchat server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible API serving chat and embeddings.
    pub llm_base_url: String,
    /// Optional bearer token sent with upstream requests.
    pub llm_api_key: Option<String>,
    /// Chat model identifier passed to the provider.
    pub chat_model: String,
    /// Sampling temperature for answer synthesis.
    pub chat_temperature: f32,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Directory receiving raw uploaded files.
    pub upload_dir: String,
    /// Character budget per chunk during index builds.
    pub chunk_size: usize,
    /// Sliding character overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per question.
    pub retriever_top_k: usize,
    /// Bound on each upstream HTTP call, in seconds.
    pub upstream_timeout_secs: u64,
    /// Additional attempts after a transient upstream failure.
    pub upstream_retry_limit: usize,
    /// Newest turns forwarded to the model when conditioning an answer.
    pub history_window: usize,
    /// Optional append-only JSONL file mirroring chat turns.
    pub chat_log_path: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Read every setting from the environment, validating numeric values as they load.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            llm_base_url: require_env("LLM_BASE_URL")?,
            llm_api_key: optional_env("LLM_API_KEY"),
            chat_model: require_env("CHAT_MODEL")?,
            chat_temperature: parse_env("CHAT_TEMPERATURE")?.unwrap_or(0.7),
            embedding_model: require_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .ok_or_else(|| ConfigError::MissingVariable("EMBEDDING_DIMENSION".into()))?,
            upload_dir: optional_env("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            chunk_size: parse_env("TEXT_SPLITTER_CHUNK_SIZE")?.unwrap_or(200),
            chunk_overlap: parse_env("TEXT_SPLITTER_CHUNK_OVERLAP")?.unwrap_or(20),
            retriever_top_k: parse_env("RETRIEVER_TOP_K")?.unwrap_or(3),
            upstream_timeout_secs: parse_env("UPSTREAM_TIMEOUT_SECS")?.unwrap_or(30),
            upstream_retry_limit: parse_env("UPSTREAM_RETRY_LIMIT")?.unwrap_or(2),
            history_window: parse_env("HISTORY_WINDOW")?.unwrap_or(20),
            chat_log_path: optional_env("CHAT_LOG_PATH"),
            server_port: parse_env("SERVER_PORT")?,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(None),
    }
}

/// Process-wide configuration, installed once by [`init_config`].
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Borrow the installed configuration. Panics when called before [`init_config`].
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("configuration not initialized")
}

/// Load `.env` if present, read the environment, and install the result globally.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("invalid environment configuration");
    tracing::debug!(
        llm_base_url = %config.llm_base_url,
        chat_model = %config.chat_model,
        embedding_model = %config.embedding_model,
        upload_dir = %config.upload_dir,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("configuration already installed");
}
