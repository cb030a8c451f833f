//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

#[derive(Deserialize)]
pub(super) struct RawConfig {
    pub bot: RawBot,
    #[serde(default)]
    pub http: RawHttp,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub retrieval: RawRetrieval,
    #[serde(default)]
    pub conversation: RawConversation,
    #[serde(default)]
    pub unanswered: RawUnanswered,
    #[serde(default)]
    pub phrasing: RawPhrasing,
}

#[derive(Deserialize)]
pub(super) struct RawBot {
    pub name: String,
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawHttp {
    /// Defaults to `true`: the binary exists to serve the API.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_bind")]
    pub bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: true, bind: default_http_bind() }
    }
}

// ── LLM ───────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
pub(super) struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_temperature")]
    pub temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

// ── Pipeline tuning ───────────────────────────────────────────────────────────

/// Every field is optional; unset fields keep the built-in defaults.
#[derive(Deserialize, Default)]
pub(super) struct RawRetrieval {
    pub min_confidence: Option<f64>,
    pub source_min_confidence: Option<f64>,
    pub max_entries: Option<usize>,
    pub max_excerpts: Option<usize>,
    pub excerpt_window_chars: Option<usize>,
}

#[derive(Deserialize, Default)]
pub(super) struct RawConversation {
    pub window: Option<usize>,
}

#[derive(Deserialize, Default)]
pub(super) struct RawUnanswered {
    pub key_prefix_len: Option<usize>,
    pub max_page: Option<usize>,
}

#[derive(Deserialize, Default)]
pub(super) struct RawPhrasing {
    pub exclusion_sample: Option<usize>,
    pub requested: Option<usize>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub(super) fn default_llm_provider() -> String { "dummy".to_string() }
pub(super) fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
pub(super) fn default_openai_model() -> String { "gpt-4o-mini".to_string() }
pub(super) fn default_openai_temperature() -> f32 { 0.4 }
pub(super) fn default_openai_timeout_seconds() -> u64 { 60 }
pub(super) fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_true() -> bool { true }
