//! Context assembly: turns match results, bot settings and recent history
//! into one generation request.

use std::path::Path;

use crate::llm::ChatTurn;
use crate::retrieval::{Excerpt, MatchResult, ScoredEntry};
use crate::store::{BotSettings, ChatMessage, MessageRole};

use super::prompt::{ASSISTANT_FALLBACK, PromptBuilder, or_none};

pub fn format_entries(entries: &[ScoredEntry]) -> String {
    entries
        .iter()
        .map(|s| {
            let e = &s.entry;
            let mut block = format!("Q: {}\nA: {}", e.question, e.answer);
            if !e.alternative_answers.is_empty() {
                block.push_str("\nOther ways to say it:");
                for alt in &e.alternative_answers {
                    block.push_str("\n- ");
                    block.push_str(alt);
                }
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_excerpts(excerpts: &[Excerpt]) -> String {
    excerpts
        .iter()
        .map(|x| format!("[{}]\n{}", x.title, x.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System context for a chat reply.
pub fn system_context(prompts_dir: &Path, settings: &BotSettings, matched: &MatchResult) -> String {
    let entries = format_entries(&matched.entries);
    let excerpts = format_excerpts(&matched.excerpts);
    PromptBuilder::new(prompts_dir)
        .layer_or("assistant.md", ASSISTANT_FALLBACK)
        .var("knowledge", or_none(&settings.knowledge))
        .var("rules", or_none(&settings.rules))
        .var("entries", or_none(&entries))
        .var("excerpts", or_none(&excerpts))
        .build()
}

/// Map logged messages (oldest first) to provider turns.
pub fn conversation_window(messages: &[ChatMessage]) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| match m.role {
            MessageRole::User => ChatTurn::user(m.content.clone()),
            MessageRole::Bot => ChatTurn::assistant(m.content.clone()),
        })
        .collect()
}
