//! Application configuration for Chatscribe.
//!
//! User config lives at `~/.chatscribe/chatscribe.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChatscribeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "chatscribe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".chatscribe";

// ---------------------------------------------------------------------------
// Config structs (matching chatscribe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Model provider settings (embeddings + chat completions).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chunking settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Section generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Page fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// `serve` subcommand settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory generated articles are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Reduce chunks to cluster representatives before generation.
    #[serde(default)]
    pub cluster: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            cluster: false,
        }
    }
}

fn default_output_dir() -> String {
    ".".into()
}

/// `[provider]` section. Any OpenAI-compatible endpoint works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the API (without the trailing `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat model used for sections and summaries.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model used for chunking and clustering.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature for every completion.
    #[serde(default)]
    pub temperature: f32,

    /// Per-request timeout in seconds. Streams may run this long per section.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attempts for retryable embedding failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Maximum inputs per embeddings request.
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.0,
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            embedding_batch_size: default_embedding_batch_size(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_request_timeout() -> u64 {
    300
}
fn default_max_retries() -> usize {
    3
}
fn default_embedding_batch_size() -> usize {
    64
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Use embedding breakpoints; when false, always chunk by size.
    #[serde(default = "default_true")]
    pub semantic: bool,

    /// Target chunk size in characters for size-based chunking.
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,

    /// Characters carried from the end of one chunk into the next.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,

    /// Neighbouring sentences on each side included in a breakpoint window.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// IQR multiplier for the breakpoint distance threshold.
    #[serde(default = "default_breakpoint_multiplier")]
    pub breakpoint_multiplier: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            semantic: true,
            target_chars: default_target_chars(),
            overlap_chars: default_overlap_chars(),
            buffer_size: default_buffer_size(),
            breakpoint_multiplier: default_breakpoint_multiplier(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_target_chars() -> usize {
    1500
}
fn default_overlap_chars() -> usize {
    200
}
fn default_buffer_size() -> usize {
    1
}
fn default_breakpoint_multiplier() -> f32 {
    1.5
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Words of literal article tail passed to middle/last sections.
    #[serde(default = "default_trailing_window_words")]
    pub trailing_window_words: usize,

    /// Upper bound on clusters when clustering is enabled.
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Lloyd iterations for k-means.
    #[serde(default = "default_kmeans_iterations")]
    pub kmeans_iterations: usize,

    /// Trigram overlap with the running summary above which a section is flagged.
    #[serde(default = "default_overlap_warn_ratio")]
    pub overlap_warn_ratio: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            trailing_window_words: default_trailing_window_words(),
            max_clusters: default_max_clusters(),
            kmeans_iterations: default_kmeans_iterations(),
            overlap_warn_ratio: default_overlap_warn_ratio(),
        }
    }
}

fn default_trailing_window_words() -> usize {
    200
}
fn default_max_clusters() -> usize {
    10
}
fn default_kmeans_iterations() -> usize {
    20
}
fn default_overlap_warn_ratio() -> f64 {
    0.5
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for the page GET, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Optional User-Agent override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: None,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.chatscribe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ChatscribeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.chatscribe/chatscribe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ChatscribeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ChatscribeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ChatscribeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ChatscribeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ChatscribeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the provider API key from the env var named in config.
pub fn resolve_api_key(provider: &ProviderConfig) -> Result<String> {
    let var_name = &provider.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(ChatscribeError::config(format!(
            "API key not found. Set the {var_name} environment variable \
             (a .env file in the working directory is also read)."
        ))),
    }
}

/// Check that the provider API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.provider).map(|_| ())
}
