//! Alternative-phrasing generator.
//!
//! Asks the generator for new ways to ask and answer an entry's question and
//! merges the results into the entry with set semantics. Curated phrasings
//! are never replaced or reordered.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PhrasingConfig;
use crate::curation::first_json_object;
use crate::error::AppError;
use crate::llm::{ChatTurn, LlmProvider};
use crate::pipeline::prompt::{PHRASING_FALLBACK, PromptBuilder, or_none};
use crate::store::{KnowledgeEntry, KnowledgeUpdate, Store};

const PHRASING_TURN: &str = "Write the new phrasings now.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhrasingOutcome {
    pub entry: KnowledgeEntry,
    pub added_questions: Vec<String>,
    pub added_answers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PhrasingReply {
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    answers: Vec<String>,
}

/// Case- and whitespace-insensitive identity of a phrasing.
fn phrasing_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Phrasings shown to the generator as "do not repeat": the entry's own
/// questions and answers plus up to `sample` questions of other entries.
pub fn exclusion_list(entry: &KnowledgeEntry, others: &[KnowledgeEntry], sample: usize) -> Vec<String> {
    let own = entry
        .phrasings()
        .chain(std::iter::once(entry.answer.as_str()))
        .chain(entry.alternative_answers.iter().map(String::as_str));
    let foreign = others
        .iter()
        .filter(|o| o.id != entry.id && o.is_active)
        .flat_map(|o| o.phrasings())
        .take(sample);
    own.chain(foreign).map(str::to_string).collect()
}

/// Candidates not already present (by key) in `blocked`, in order, without
/// repeats. Accepted candidates are added to `blocked`.
fn merge_new(candidates: Vec<String>, blocked: &mut HashSet<String>) -> Vec<String> {
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && blocked.insert(phrasing_key(c)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct PhrasingGenerator {
    config: PhrasingConfig,
}

impl PhrasingGenerator {
    pub fn new(config: PhrasingConfig) -> Self {
        Self { config }
    }

    pub fn build_prompt(&self, prompts_dir: &Path, entry: &KnowledgeEntry, exclusions: &[String]) -> String {
        let listed = exclusions.iter().map(|e| format!("- {e}")).collect::<Vec<_>>().join("\n");
        PromptBuilder::new(prompts_dir)
            .layer_or("phrasing.md", PHRASING_FALLBACK)
            .var("question", entry.question.as_str())
            .var("answer", entry.answer.as_str())
            .var("count", self.config.requested.to_string())
            .var("exclusions", or_none(&listed))
            .build()
    }

    /// Generate and store new alternative phrasings for `entry_id`.
    pub async fn generate(
        &self,
        store: &Store,
        llm: &LlmProvider,
        prompts_dir: &Path,
        entry_id: &str,
    ) -> Result<PhrasingOutcome, AppError> {
        let id = entry_id.to_string();
        let (entry, others) = store
            .blocking("load phrasing context", move |s| {
                Ok((s.get_entry(&id)?, s.list_active_entries()?))
            })
            .await?;

        let exclusions = exclusion_list(&entry, &others, self.config.exclusion_sample);
        let prompt = self.build_prompt(prompts_dir, &entry, &exclusions);
        let reply = llm.generate(&prompt, &[ChatTurn::user(PHRASING_TURN)]).await?;
        let reply: PhrasingReply = first_json_object(&reply)?;

        let mut blocked_questions: HashSet<String> = entry.phrasings().map(phrasing_key).collect();
        blocked_questions.extend(
            others
                .iter()
                .filter(|o| o.id != entry.id)
                .flat_map(|o| o.phrasings())
                .map(phrasing_key),
        );
        let mut blocked_answers: HashSet<String> = std::iter::once(entry.answer.as_str())
            .chain(entry.alternative_answers.iter().map(String::as_str))
            .map(phrasing_key)
            .collect();

        let added_questions = merge_new(reply.questions, &mut blocked_questions);
        let added_answers = merge_new(reply.answers, &mut blocked_answers);

        if added_questions.is_empty() && added_answers.is_empty() {
            info!(entry_id, "phrasing: nothing new");
            return Ok(PhrasingOutcome { entry, added_questions, added_answers });
        }

        let mut questions = entry.alternative_questions.clone();
        questions.extend(added_questions.iter().cloned());
        let mut answers = entry.alternative_answers.clone();
        answers.extend(added_answers.iter().cloned());

        let id = entry.id.clone();
        let entry = store
            .blocking("store phrasings", move |s| {
                s.update_entry(
                    &id,
                    KnowledgeUpdate {
                        alternative_questions: Some(questions),
                        alternative_answers: Some(answers),
                        ..KnowledgeUpdate::default()
                    },
                )
            })
            .await?;

        info!(
            entry_id,
            questions = added_questions.len(),
            answers = added_answers.len(),
            "phrasing: merged"
        );
        Ok(PhrasingOutcome { entry, added_questions, added_answers })
    }
}
