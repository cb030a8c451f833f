//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies `ROUW_WORK_DIR` and `ROUW_LOG_LEVEL` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Deep-merge two TOML values.
/// Tables merge recursively; any other overlay value replaces the base value.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// merged value. `visited` catches circular references.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from `config_path`, or `config/default.toml`, then apply
/// env-var overrides. Without an explicit path and without the default file,
/// returns [`Config::minimal`] rooted at `~/.rouw`.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("ROUW_WORK_DIR").ok();
    let log_level_override = env::var("ROUW_LOG_LEVEL").ok();

    let path = match config_path {
        Some(p) => PathBuf::from(p),
        None => {
            let default_path = PathBuf::from("config/default.toml");
            if !default_path.exists() {
                let work_dir = expand_home(work_dir_override.as_deref().unwrap_or("~/.rouw"));
                let mut config = Config::minimal(work_dir);
                if let Some(level) = log_level_override {
                    config.log_level = level;
                }
                config.llm_api_key = env::var("LLM_API_KEY").ok();
                return Ok(config);
            }
            default_path
        }
    };

    let mut config = load_from(&path, work_dir_override.as_deref(), log_level_override.as_deref())?;
    config.llm_api_key = env::var("LLM_API_KEY").ok();
    Ok(config)
}

/// Internal loader: accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged = load_raw_merged(path, &mut HashSet::new())?;
    let parsed = RawConfig::deserialize(merged)
        .map_err(|e| AppError::Config(format!("invalid config in {}: {e}", path.display())))?;

    let b = parsed.bot;
    let work_dir = expand_home(work_dir_override.unwrap_or(&b.work_dir));
    let log_level = log_level_override.unwrap_or(&b.log_level).to_string();
    let log_file = b.log_file.map(|p| resolve_in(&work_dir, &p));

    let defaults = Config::minimal(work_dir.clone());
    let r = parsed.retrieval;
    let retrieval = RetrievalConfig {
        min_confidence: r.min_confidence.unwrap_or(defaults.retrieval.min_confidence),
        source_min_confidence: r
            .source_min_confidence
            .unwrap_or(defaults.retrieval.source_min_confidence),
        max_entries: r.max_entries.unwrap_or(defaults.retrieval.max_entries),
        max_excerpts: r.max_excerpts.unwrap_or(defaults.retrieval.max_excerpts),
        excerpt_window_chars: r
            .excerpt_window_chars
            .unwrap_or(defaults.retrieval.excerpt_window_chars),
    };
    validate_unit("retrieval.min_confidence", retrieval.min_confidence)?;
    validate_unit("retrieval.source_min_confidence", retrieval.source_min_confidence)?;
    if retrieval.excerpt_window_chars == 0 {
        return Err(AppError::Config("retrieval.excerpt_window_chars must be > 0".into()));
    }

    let window = parsed.conversation.window.unwrap_or(defaults.conversation.window);
    if window == 0 {
        return Err(AppError::Config("conversation.window must be > 0".into()));
    }

    Ok(Config {
        bot_name: b.name,
        work_dir,
        log_level,
        log_file,
        prompts_dir: PathBuf::from(b.prompts_dir),
        http: HttpConfig { enabled: parsed.http.enabled, bind: parsed.http.bind },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        llm_api_key: None,
        retrieval,
        conversation: ConversationConfig { window },
        unanswered: UnansweredConfig {
            key_prefix_len: parsed
                .unanswered
                .key_prefix_len
                .unwrap_or(defaults.unanswered.key_prefix_len),
            max_page: parsed.unanswered.max_page.unwrap_or(defaults.unanswered.max_page),
        },
        phrasing: PhrasingConfig {
            exclusion_sample: parsed
                .phrasing
                .exclusion_sample
                .unwrap_or(defaults.phrasing.exclusion_sample),
            requested: parsed.phrasing.requested.unwrap_or(defaults.phrasing.requested),
        },
    })
}

fn validate_unit(name: &str, value: f64) -> Result<(), AppError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!("{name} must be within 0.0..=1.0, got {value}")))
    }
}

/// Relative paths are taken relative to `work_dir`.
fn resolve_in(work_dir: &Path, p: &str) -> PathBuf {
    let path = expand_home(p);
    if path.is_absolute() { path } else { work_dir.join(path) }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
