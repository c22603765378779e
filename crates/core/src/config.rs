//! Configuration management for Ark Study.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config files (`.ark/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources override earlier ones.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ark/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// Generation and embedding backend settings
    pub llm: LlmSettings,

    /// Retrieval pipeline tunables
    pub rag: RagSettings,

    /// Delegated store settings
    pub store: StoreSettings,
}

/// Generation backend settings.
///
/// The backend counts as configured only when the settings the provider
/// needs are present; see [`LlmSettings::is_configured`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    /// Provider identifier ("openai" or "ollama")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of the OpenAI-compatible API or the Ollama endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key (OpenAI-compatible providers only)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat/completion model
    #[serde(default)]
    pub chat_model: Option<String>,

    /// Embedding model; when unset the local hashed embedder is used
    #[serde(default)]
    pub embedding_model: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            chat_model: None,
            embedding_model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmSettings {
    /// Whether the provider's required settings are all present.
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.provider.to_lowercase().as_str() {
            "ollama" => present(&self.base_url) && present(&self.chat_model),
            _ => present(&self.base_url) && present(&self.api_key),
        }
    }
}

/// Tunables consumed by the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RagSettings {
    /// Embedding dimension shared by the embedder and the vector index
    pub vector_dim: usize,

    /// Default chunk budget in tokens
    pub chunk_max_tokens: usize,

    /// Default overlap between consecutive chunks in tokens
    pub chunk_overlap_tokens: usize,

    /// Upper bound applied to a caller-supplied turn count
    pub max_history_turns_cap: usize,

    /// Turns used when a caller supplies a session id but no turn count
    pub default_session_turns: usize,

    /// Minimum number of turns fetched from memory before trimming
    pub history_fetch_turns: usize,

    /// Soft cap on stored messages per session
    pub max_messages_per_session: usize,

    /// Default result count for search
    pub search_top_k: usize,

    /// Hits retrieved to ground an answer
    pub ask_top_k: usize,

    /// Length of source snippets returned with an answer, in characters
    pub snippet_chars: usize,

    /// Weight of the vector term in hybrid search
    pub hybrid_vector_weight: f32,

    /// Weight of the lexical term in hybrid search
    pub hybrid_text_weight: f32,

    /// Maximum number of background tasks running at once
    pub background_concurrency: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            vector_dim: 128,
            chunk_max_tokens: 512,
            chunk_overlap_tokens: 50,
            max_history_turns_cap: 20,
            default_session_turns: 3,
            history_fetch_turns: 20,
            max_messages_per_session: 200,
            search_top_k: 5,
            ask_top_k: 3,
            snippet_chars: 120,
            hybrid_vector_weight: 0.7,
            hybrid_text_weight: 0.3,
            background_concurrency: 4,
        }
    }
}

/// Delegated store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path; no delegated store when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSettings>,
    rag: Option<RagSettings>,
    store: Option<StoreSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: LlmSettings::default(),
            rag: RagSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

/// First non-empty value among the given environment variables.
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from defaults, the YAML file and environment variables.
    ///
    /// Environment variables:
    /// - `ARK_WORKSPACE`: Override workspace path
    /// - `ARK_CONFIG`: Path to config file
    /// - `ARK_STORE_PATH`: SQLite path for the delegated store
    /// - `ARK_PROVIDER`: Generation provider ("openai", "ollama")
    /// - `OPENAI_BASE_URL` / `LLM_OPENAI_BASE_URL`: API base URL
    /// - `OPENAI_API_KEY` / `LLM_OPENAI_API_KEY`: API key
    /// - `OPENAI_MODEL` / `LLM_OPENAI_MODEL`: Chat model
    /// - `OPENAI_EMBEDDING_MODEL` / `LLM_OPENAI_EMBEDDING_MODEL`: Embedding model
    /// - `OLLAMA_URL`: Ollama endpoint
    /// - `LLM_VECTOR_DIM`: Embedding dimension
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use ark_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`load`](Self::load), with an explicit workspace and config file
    /// taking precedence over `ARK_WORKSPACE` and `ARK_CONFIG`.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var("ARK_WORKSPACE").ok().map(PathBuf::from))
        {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("ARK_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.ark_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        config.apply_env()?;

        Ok(config)
    }

    /// Apply environment variable overrides on top of the current values.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Some(provider) = env_any(&["ARK_PROVIDER"]) {
            self.llm.provider = provider;
        }

        let base_url = if self.llm.provider.eq_ignore_ascii_case("ollama") {
            env_any(&["OLLAMA_URL"])
        } else {
            env_any(&["OPENAI_BASE_URL", "LLM_OPENAI_BASE_URL"])
        };
        if base_url.is_some() {
            self.llm.base_url = base_url;
        }

        if let Some(key) = env_any(&["OPENAI_API_KEY", "LLM_OPENAI_API_KEY"]) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = env_any(&["OPENAI_MODEL", "LLM_OPENAI_MODEL"]) {
            self.llm.chat_model = Some(model);
        }
        if let Some(model) = env_any(&["OPENAI_EMBEDDING_MODEL", "LLM_OPENAI_EMBEDDING_MODEL"]) {
            self.llm.embedding_model = Some(model);
        }

        if let Some(dim) = env_any(&["LLM_VECTOR_DIM"]) {
            self.rag.vector_dim = dim.trim().parse().map_err(|e| {
                AppError::Config(format!("Invalid LLM_VECTOR_DIM '{}': {}", dim, e))
            })?;
        }

        if let Some(path) = env_any(&["ARK_STORE_PATH"]) {
            self.store.path = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().merge_file(config_file))
    }

    fn merge_file(mut self, config_file: ConfigFile) -> Self {
        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(json) = logging.json {
                self.log_json = json;
            }
        }

        if let Some(llm) = config_file.llm {
            self.llm = llm;
        }

        if let Some(rag) = config_file.rag {
            self.rag = rag;
        }

        if let Some(store) = config_file.store {
            if let Some(path) = store.path {
                // Relative store paths are resolved against the workspace
                self.store.path = Some(if path.is_relative() {
                    self.workspace.join(path)
                } else {
                    path
                });
            }
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        store_path: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        log_json: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(store_path) = store_path {
            self.store.path = Some(store_path);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        if log_json {
            self.log_json = true;
        }

        self
    }

    /// Get the path to the .ark directory.
    pub fn ark_dir(&self) -> PathBuf {
        self.workspace.join(".ark")
    }

    /// Ensure the .ark directory exists.
    pub fn ensure_ark_dir(&self) -> AppResult<()> {
        let ark_dir = self.ark_dir();
        if !ark_dir.exists() {
            std::fs::create_dir_all(&ark_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ark directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Validate the configuration values the pipeline depends on.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["openai", "ollama"];
        if !known_providers.contains(&self.llm.provider.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                known_providers.join(", ")
            )));
        }

        if self.rag.vector_dim == 0 {
            return Err(AppError::Config(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }

        if self.rag.max_messages_per_session == 0 {
            return Err(AppError::Config(
                "Per-session message cap must be greater than zero".to_string(),
            ));
        }

        let weights = [self.rag.hybrid_vector_weight, self.rag.hybrid_text_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::Config(format!(
                "Hybrid weights must be finite and non-negative, got {:?}",
                weights
            )));
        }

        Ok(())
    }
}
