//! AI-assisted analysis of a flagged answer.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::pipeline::prompt::{CURATION_FALLBACK, PromptBuilder, or_none};
use crate::store::{ChatMessage, MessageRole};

/// Instruction turn sent along with the curation system prompt.
pub(crate) const ANALYZE_TURN: &str = "Analyse the answer marked not helpful and reply with the JSON object.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Rules,
    Knowledge,
}

/// A proposed fix for a flagged answer. Produced by analysis, freely edited by
/// the operator, consumed by commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationSuggestion {
    /// The flagged message this came from. `None` for hand-built suggestions.
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub problem_summary: String,
    pub target_type: TargetType,
    #[serde(default)]
    pub rationale: String,
    /// Rule text to append when `target_type` is `rules`.
    #[serde(default)]
    pub proposed_text: String,
    #[serde(default)]
    pub proposed_question: String,
    #[serde(default)]
    pub proposed_answer: String,
    #[serde(default)]
    pub proposed_category: String,
    /// Update this entry instead of inserting a new one.
    #[serde(default)]
    pub target_entry_id: Option<String>,
    /// Digest of the editable fields as analysis produced them.
    #[serde(default)]
    pub fingerprint: String,
}

impl CurationSuggestion {
    pub fn rules(text: impl Into<String>) -> Self {
        Self::blank(TargetType::Rules, text.into(), String::new(), String::new(), String::new())
    }

    pub fn knowledge(
        question: impl Into<String>,
        answer: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self::blank(TargetType::Knowledge, String::new(), question.into(), answer.into(), category.into())
    }

    fn blank(target_type: TargetType, text: String, q: String, a: String, c: String) -> Self {
        Self {
            message_id: None,
            problem_summary: String::new(),
            target_type,
            rationale: String::new(),
            proposed_text: text,
            proposed_question: q,
            proposed_answer: a,
            proposed_category: c,
            target_entry_id: None,
            fingerprint: String::new(),
        }
    }

    /// sha256 over everything the commit acts on.
    pub fn compute_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let target = match self.target_type {
            TargetType::Rules => "rules",
            TargetType::Knowledge => "knowledge",
        };
        for field in [
            target,
            self.proposed_text.as_str(),
            self.proposed_question.as_str(),
            self.proposed_answer.as_str(),
            self.proposed_category.as_str(),
            self.target_entry_id.as_deref().unwrap_or(""),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    pub(crate) fn sealed(mut self) -> Self {
        self.fingerprint = self.compute_fingerprint();
        self
    }

    /// `true` when the fields differ from what analysis produced, or when the
    /// suggestion never went through analysis.
    pub fn is_edited(&self) -> bool {
        self.fingerprint != self.compute_fingerprint()
    }
}

pub fn build_prompt(prompts_dir: &Path, conversation: &[ChatMessage], flagged: &ChatMessage) -> String {
    let transcript = conversation
        .iter()
        .map(|m| {
            let speaker = match m.role {
                MessageRole::User => "user",
                MessageRole::Bot => "bot",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    PromptBuilder::new(prompts_dir)
        .layer_or("curation.md", CURATION_FALLBACK)
        .var("conversation", or_none(&transcript))
        .var("flagged", flagged.content.as_str())
        .build()
}

#[derive(Deserialize)]
struct RawSuggestion {
    #[serde(default)]
    problem_summary: String,
    #[serde(default)]
    target_type: String,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    proposed_text: String,
    #[serde(default)]
    proposed_question: String,
    #[serde(default)]
    proposed_answer: String,
    #[serde(default)]
    proposed_category: String,
}

/// Deserialize the first JSON object embedded in a model reply. Models tend
/// to wrap JSON in prose or code fences, so anything before the first `{`
/// and after the object is ignored.
pub(crate) fn first_json_object<T: serde::de::DeserializeOwned>(reply: &str) -> Result<T, AppError> {
    let start = reply
        .find('{')
        .ok_or_else(|| AppError::Generation("reply contains no JSON object".into()))?;
    let mut stream = serde_json::Deserializer::from_str(&reply[start..]).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(AppError::Generation(format!("malformed JSON in reply: {e}"))),
        None => Err(AppError::Generation("reply contains no JSON object".into())),
    }
}

pub fn parse_reply(reply: &str, message_id: Option<String>) -> Result<CurationSuggestion, AppError> {
    let raw: RawSuggestion = first_json_object(reply)?;
    let target_type = match raw.target_type.trim().to_lowercase().as_str() {
        "rules" | "rule" => TargetType::Rules,
        "knowledge" => TargetType::Knowledge,
        other => {
            return Err(AppError::Generation(format!("unknown target_type '{other}' in reply")));
        }
    };
    Ok(CurationSuggestion {
        message_id,
        problem_summary: raw.problem_summary.trim().to_string(),
        target_type,
        rationale: raw.rationale.trim().to_string(),
        proposed_text: raw.proposed_text.trim().to_string(),
        proposed_question: raw.proposed_question.trim().to_string(),
        proposed_answer: raw.proposed_answer.trim().to_string(),
        proposed_category: raw.proposed_category.trim().to_string(),
        target_entry_id: None,
        fingerprint: String::new(),
    }
    .sealed())
}
