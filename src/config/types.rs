//! Public configuration structs consumed by the service, pipeline and API.

use std::path::PathBuf;

/// HTTP API configuration (`[http]`).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whether the axum API is started by the binary.
    pub enabled: bool,
    /// Socket address to bind the API to.
    pub bind: String,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// Generation capability configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Matcher thresholds and context budgets (`[retrieval]`).
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Minimum phrasing score for a knowledge entry to count as a match.
    pub min_confidence: f64,
    /// Minimum query coverage for a source excerpt to count as a match.
    pub source_min_confidence: f64,
    /// Top-K knowledge entries handed to the assembler.
    pub max_entries: usize,
    /// Top-M source excerpts handed to the assembler.
    pub max_excerpts: usize,
    /// Character capacity of one source window.
    pub excerpt_window_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            source_min_confidence: 0.6,
            max_entries: 5,
            max_excerpts: 3,
            excerpt_window_chars: 800,
        }
    }
}

/// Conversation window size (`[conversation]`).
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Number of most recent log messages sent with each generation request.
    pub window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { window: 10 }
    }
}

/// Unanswered-question grouping (`[unanswered]`).
#[derive(Debug, Clone)]
pub struct UnansweredConfig {
    /// Normalised questions are truncated to this many characters to form
    /// the group key.
    pub key_prefix_len: usize,
    /// Hard cap on groups returned per page.
    pub max_page: usize,
}

impl Default for UnansweredConfig {
    fn default() -> Self {
        Self { key_prefix_len: 60, max_page: 100 }
    }
}

/// Phrasing generator limits (`[phrasing]`).
#[derive(Debug, Clone)]
pub struct PhrasingConfig {
    /// How many phrasings of other entries go into the exclusion list.
    pub exclusion_sample: usize,
    /// How many new phrasings to ask the generator for.
    pub requested: usize,
}

impl Default for PhrasingConfig {
    fn default() -> Self {
        Self { exclusion_sample: 50, requested: 5 }
    }
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Directory holding the database and stored source files (no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Append logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Directory with prompt templates. Missing templates fall back to
    /// built-in text.
    pub prompts_dir: PathBuf,
    pub http: HttpConfig,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY` env var: `None` for keyless local models.
    /// Never sourced from TOML.
    pub llm_api_key: Option<String>,
    pub retrieval: RetrievalConfig,
    pub conversation: ConversationConfig,
    pub unanswered: UnansweredConfig,
    pub phrasing: PhrasingConfig,
}

impl Config {
    /// Built-in configuration rooted at `work_dir`: dummy provider, HTTP off,
    /// default thresholds. Used when no config file exists and by tests.
    pub fn minimal(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            bot_name: "rouw".to_string(),
            work_dir: work_dir.into(),
            log_level: "info".to_string(),
            log_file: None,
            prompts_dir: PathBuf::from("config/prompts"),
            http: HttpConfig { enabled: false, bind: super::raw::default_http_bind() },
            llm: LlmConfig {
                provider: super::raw::default_llm_provider(),
                openai: OpenAiConfig {
                    api_base_url: super::raw::default_openai_api_base_url(),
                    model: super::raw::default_openai_model(),
                    temperature: super::raw::default_openai_temperature(),
                    timeout_seconds: super::raw::default_openai_timeout_seconds(),
                },
            },
            llm_api_key: None,
            retrieval: RetrievalConfig::default(),
            conversation: ConversationConfig::default(),
            unanswered: UnansweredConfig::default(),
            phrasing: PhrasingConfig::default(),
        }
    }

    /// Path of the SQLite database inside `work_dir`.
    pub fn db_path(&self) -> PathBuf {
        self.work_dir.join("rouw.db")
    }

    /// Directory where uploaded PDFs are kept.
    pub fn sources_dir(&self) -> PathBuf {
        self.work_dir.join("sources")
    }
}
