use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole question-answering backend.
///
/// Every section has defaults, so a partial `config.yaml` only needs to
/// list the values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub prompt: PromptConfig,
    pub evaluation: EvaluationConfig,
}

/// Which backend serves chat completions and embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Generative Language API (requires an API key)
    Gemini,
    /// Local Ollama server
    Ollama,
}

/// Configuration for the generation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    /// Name of the environment variable holding the provider credential.
    pub api_key_env: String,
    /// Per-request timeout applied to the HTTP client, if set.
    pub request_timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "gemini-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.1,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            request_timeout_secs: None,
        }
    }
}

/// Configuration for RAG processing.
///
/// This covers embedding settings and text processing behavior (chunking, retrieval).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Number of passages retrieved per query
    pub top_k: usize,
    pub indexer: IndexerConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_model: "models/embedding-001".to_string(),
            chunk_size: 1024,
            chunk_overlap: 128,
            top_k: 2,
            indexer: IndexerConfig::default(),
        }
    }
}

/// Configuration for document loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// File extensions to load (e.g., ["md", "txt"])
    /// Empty list (default) means load all readable text files
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Patterns to exclude - skips directories/files containing these strings
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_exclude_patterns() -> Vec<String> {
    crate::patterns::default_exclude_patterns()
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// Locations of the source documents and the persisted index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persisted index directory. Its existence means "load, don't build".
    pub storage_dir: PathBuf,
    /// Directory holding the source documents.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./storage"),
            data_dir: PathBuf::from("./md"),
        }
    }
}

/// How `/api/chat` produces its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Tokens are relayed to the client as the provider produces them.
    Streaming,
    /// The full answer is produced (and optionally evaluated) before it is sent.
    EvaluatedSync,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub response_mode: ResponseMode,
    /// Forward earlier turns to the provider as conversation history.
    pub use_history: bool,
    pub cors: bool,
    /// Deadline for retrieval plus provider request initiation.
    pub query_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            response_mode: ResponseMode::Streaming,
            use_history: false,
            cors: true,
            query_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
    /// Closing instruction appended to rendered patient-history forms.
    pub form_instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a medical advisor who answers using the provided reference material. \
                            If the material does not cover the question, say so."
                .to_string(),
            form_instruction: "Provide a list of Management and Further treatment options for this patient."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub enabled: bool,
    pub app_id: String,
    /// JSON-lines file that evaluation records are appended to.
    pub records_path: PathBuf,
    /// Judge model; falls back to `llm.model` when unset.
    pub model: Option<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: "Diagnosys".to_string(),
            records_path: PathBuf::from("./evaluations.jsonl"),
            model: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }

    /// Judge model used by the evaluation recorder.
    pub fn evaluation_model(&self) -> &str {
        self.evaluation.model.as_deref().unwrap_or(&self.llm.model)
    }
}
