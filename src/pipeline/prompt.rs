//! Layered prompt builder.
//!
//! Prompts are assembled from plain-text templates under `config/prompts/`.
//! Each layer is appended in order. A layer whose file is missing is either
//! skipped or replaced by a built-in fallback, so a bare install without a
//! prompts directory still produces usable prompts.
//!
//! ```text
//! assistant.md: system context for chat replies
//!                {{knowledge}} {{rules}} {{entries}} {{excerpts}}
//! curation.md : flagged-answer analysis; {{conversation}} {{flagged}}
//! phrasing.md : alternative phrasings; {{question}} {{answer}} {{count}} {{exclusions}}
//! ```
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SEPARATOR: &str = "\n\n";

pub const ASSISTANT_FALLBACK: &str = "You are a calm, warm companion for people who are grieving. \
Answer in the language the user writes in.

## Background knowledge
{{knowledge}}

## Rules you must follow
{{rules}}

## Curated answers that may apply
{{entries}}

## Excerpts from reference material
{{excerpts}}";

pub const CURATION_FALLBACK: &str = "An operator marked a chatbot answer as not helpful. \
Decide whether the fix is a rule (\"rules\") or a question/answer pair (\"knowledge\"). \
Reply with one JSON object with the keys problem_summary, target_type, rationale, \
proposed_text, proposed_question, proposed_answer, proposed_category.

## Conversation
{{conversation}}

## Answer marked not helpful
{{flagged}}";

pub const PHRASING_FALLBACK: &str = "Question: {{question}}
Answer: {{answer}}

Write {{count}} new ways to ask the question and {{count}} new ways to give the answer. \
Avoid these existing phrasings:
{{exclusions}}

Reply with one JSON object: {\"questions\": [...], \"answers\": [...]}";

/// Fluent builder that assembles a layered prompt from template files.
///
/// ```rust
/// use rouw_bot::pipeline::prompt::PromptBuilder;
///
/// let prompt = PromptBuilder::new("config/prompts")
///     .layer("does_not_exist.md")
///     .append("Rules: {{rules}}")
///     .var("rules", "be kind")
///     .build();
/// assert_eq!(prompt, "Rules: be kind");
/// ```
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append a layer loaded from the prompts directory. Skipped when the
    /// file does not exist.
    pub fn layer(self, filename: &str) -> Self {
        match self.read(filename) {
            Some(text) => self.append(text),
            None => self,
        }
    }

    /// Like [`layer`](Self::layer), but appends `fallback` when the file is
    /// missing or empty.
    pub fn layer_or(self, filename: &str, fallback: &str) -> Self {
        match self.read(filename) {
            Some(text) => self.append(text),
            None => {
                tracing::debug!(filename, "prompt: using built-in template");
                self.append(fallback)
            }
        }
    }

    fn read(&self, filename: &str) -> Option<String> {
        let path = self.prompts_dir.join(filename);
        match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(_) => {
                tracing::debug!("prompt: layer '{}' not found, skipped", path.display());
                None
            }
        }
    }

    /// Append a text fragment directly.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    pub fn with_vars<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in vars {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all layers with blank lines and substitute variables.
    /// Join the layers and substitute `{{name}}` placeholders in one pass
    /// over the template. Substituted values are never scanned again, and
    /// placeholders without a value are left as they are.
    pub fn build(self) -> String {
        let template = self.parts.join(SEPARATOR);
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => match self.vars.get(&after[..end]) {
                    Some(value) => {
                        out.push_str(value);
                        rest = &after[end + 2..];
                    }
                    None => {
                        out.push_str("{{");
                        rest = after;
                    }
                },
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Render an empty section as a short marker instead of a blank heading.
pub fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "(none)" } else { text }
}
