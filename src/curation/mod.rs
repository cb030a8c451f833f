//! Curation loop: flagged bot answer → AI suggestion → operator edit →
//! committed knowledge change.
//!
//! Analysis and commit are separate calls. [`analyze`] returns a
//! [`CurationSuggestion`] value, the operator edits it wherever it lives
//! (admin UI, test code), and [`commit`] applies it. The message's progress
//! is persisted as a [`CurationState`] on its row.

mod analysis;
mod duplicates;
mod state;

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::llm::{ChatTurn, LlmProvider};
use crate::store::{
    ChatMessage, EntryFilter, Feedback, KnowledgeEntry, KnowledgeUpdate, MessageRole,
    NewKnowledgeEntry, RulesUpdate, Store,
};

pub use analysis::{CurationSuggestion, TargetType, build_prompt, parse_reply};
pub(crate) use analysis::first_json_object;
pub use duplicates::{DuplicateReason, DuplicateWarning, find_likely_duplicates};
pub use state::{CurationEvent, CurationState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", rename_all = "lowercase")]
pub enum CommitOutcome {
    Knowledge {
        entry: KnowledgeEntry,
        /// `false` when an existing entry was updated.
        created: bool,
        warnings: Vec<DuplicateWarning>,
    },
    Rules(RulesUpdate),
}

/// Record an operator verdict on a bot message. A `not_helpful` verdict
/// opens curation; `helpful` only feeds the good-examples view; `none`
/// clears the flag.
///
/// The verdict can only change while curation has not moved past
/// `Flagged`. Analyzed or edited messages must be discarded or marked
/// handled first, and archived messages stay archived.
pub fn flag(store: &Store, message_id: &str, verdict: Feedback) -> Result<ChatMessage, AppError> {
    let message = store.get_message(message_id)?;
    if message.role != MessageRole::Bot {
        return Err(AppError::validation("message_id", "only bot messages can be flagged"));
    }
    if let Some(state) = message.curation_state {
        if state != CurationState::Flagged {
            return Err(AppError::InvalidTransition(format!(
                "cannot change the verdict on a message in state {state}"
            )));
        }
    }
    let state = (verdict == Feedback::NotHelpful).then_some(CurationState::Flagged);
    let updated = store.set_feedback(message_id, verdict, state)?;
    info!(message_id, verdict = verdict.as_str(), "curation: message flagged");
    Ok(updated)
}

/// Current curation state of a flagged message.
fn current_state(message: &ChatMessage) -> Result<CurationState, AppError> {
    match (message.feedback, message.curation_state) {
        (Feedback::NotHelpful, Some(state)) => Ok(state),
        (Feedback::NotHelpful, None) => Ok(CurationState::Flagged),
        _ => Err(AppError::validation("message_id", "message is not flagged as not helpful")),
    }
}

/// Ask the generator what went wrong with a flagged answer.
///
/// The message moves to `Analyzed` only after a usable suggestion came
/// back; a failed or malformed reply leaves it where it was.
pub async fn analyze(
    store: &Store,
    llm: &LlmProvider,
    prompts_dir: &Path,
    message_id: &str,
) -> Result<CurationSuggestion, AppError> {
    let id = message_id.to_string();
    let (message, conversation) = store
        .blocking("load flagged conversation", move |s| {
            let message = s.get_message(&id)?;
            let conversation = s.list_messages(&message.session_id)?;
            Ok((message, conversation))
        })
        .await?;

    let next = current_state(&message)?.apply(CurationEvent::Analyze)?;

    let prompt = build_prompt(prompts_dir, &conversation, &message);
    let reply = llm
        .generate(&prompt, &[ChatTurn::user(analysis::ANALYZE_TURN)])
        .await?;
    let suggestion = parse_reply(&reply, Some(message.id.clone()))?;

    let id = message.id.clone();
    store
        .blocking("set curation state", move |s| s.set_curation_state(&id, next))
        .await?;
    info!(
        message_id = %message.id,
        target = ?suggestion.target_type,
        "curation: suggestion ready"
    );
    Ok(suggestion)
}

/// Apply a (possibly edited) suggestion.
///
/// Rules are appended to the existing rules text. Knowledge is inserted as
/// a new entry, or written over `target_entry_id` when that is set.
/// Duplicate warnings are returned alongside the result and never block
/// the write.
pub fn commit(store: &Store, suggestion: &CurationSuggestion) -> Result<CommitOutcome, AppError> {
    let next = match &suggestion.message_id {
        Some(id) => {
            let message = store.get_message(id)?;
            let mut state = current_state(&message)?;
            if suggestion.is_edited() {
                state = state.apply(CurationEvent::Edit)?;
            }
            Some((id.clone(), state.apply(CurationEvent::Commit)?))
        }
        None => None,
    };

    let outcome = match suggestion.target_type {
        TargetType::Rules => CommitOutcome::Rules(store.append_rules(&suggestion.proposed_text)?),
        TargetType::Knowledge => commit_knowledge(store, suggestion)?,
    };

    if let Some((id, state)) = next {
        store.set_curation_state(&id, state)?;
    }
    Ok(outcome)
}

fn commit_knowledge(store: &Store, suggestion: &CurationSuggestion) -> Result<CommitOutcome, AppError> {
    let new = NewKnowledgeEntry::new(
        suggestion.proposed_question.trim(),
        suggestion.proposed_answer.trim(),
        suggestion.proposed_category.trim(),
    );
    new.validate()?;

    let warnings = preview_duplicates(
        store,
        &new.category,
        &new.question,
        suggestion.target_entry_id.as_deref(),
    )?;
    if !warnings.is_empty() {
        warn!(count = warnings.len(), category = %new.category, "curation: likely duplicates");
    }

    let (entry, created) = match &suggestion.target_entry_id {
        Some(target) => {
            let update = KnowledgeUpdate {
                question: Some(new.question),
                answer: Some(new.answer),
                category: Some(new.category),
                ..KnowledgeUpdate::default()
            };
            (store.update_entry(target, update)?, false)
        }
        None => (store.insert_entry(new)?, true),
    };
    info!(entry_id = %entry.id, created, "curation: knowledge committed");
    Ok(CommitOutcome::Knowledge { entry, created, warnings })
}

/// Duplicate warnings for a would-be entry, skipping `exclude_id`.
pub fn preview_duplicates(
    store: &Store,
    category: &str,
    question: &str,
    exclude_id: Option<&str>,
) -> Result<Vec<DuplicateWarning>, AppError> {
    phrasing_duplicates(store, category, [question], exclude_id)
}

/// Duplicate warnings for every phrasing of a would-be entry (question and
/// alternatives), at most one per existing entry.
pub fn phrasing_duplicates<'a>(
    store: &Store,
    category: &str,
    phrasings: impl IntoIterator<Item = &'a str>,
    exclude_id: Option<&str>,
) -> Result<Vec<DuplicateWarning>, AppError> {
    let existing: Vec<KnowledgeEntry> = store
        .list_entries(&EntryFilter { active_only: true, category: Some(category.to_string()) })?
        .into_iter()
        .filter(|e| Some(e.id.as_str()) != exclude_id)
        .collect();

    let mut seen = HashSet::new();
    Ok(phrasings
        .into_iter()
        .flat_map(|p| find_likely_duplicates(category, p, &existing))
        .filter(|w| seen.insert(w.entry_id.clone()))
        .collect())
}

pub fn discard(store: &Store, message_id: &str) -> Result<CurationState, AppError> {
    transition(store, message_id, CurationEvent::Discard)
}

/// Archive a flagged message without committing anything.
pub fn mark_handled(store: &Store, message_id: &str) -> Result<CurationState, AppError> {
    transition(store, message_id, CurationEvent::MarkHandled)
}

fn transition(store: &Store, message_id: &str, event: CurationEvent) -> Result<CurationState, AppError> {
    let message = store.get_message(message_id)?;
    let next = current_state(&message)?.apply(event)?;
    store.set_curation_state(message_id, next)?;
    Ok(next)
}

/// Permanently remove a flagged message.
pub fn delete_flagged(store: &Store, message_id: &str) -> Result<(), AppError> {
    let message = store.get_message(message_id)?;
    if message.feedback == Feedback::None {
        return Err(AppError::validation("message_id", "message is not flagged"));
    }
    store.delete_message(message_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::scripted::ScriptedProvider;
    use crate::store::test_support::temp_store;

    fn flagged_exchange(store: &Store) -> ChatMessage {
        let session = store.create_session().unwrap();
        store.append_message(&session.id, MessageRole::User, "Hoe reset ik mijn wachtwoord?").unwrap();
        let bot = store.append_message(&session.id, MessageRole::Bot, "Daar kan ik niet bij helpen.").unwrap();
        flag(store, &bot.id, Feedback::NotHelpful).unwrap()
    }

    #[test]
    fn user_messages_cannot_be_flagged() {
        let (_dir, store) = temp_store();
        let session = store.create_session().unwrap();
        let user = store.append_message(&session.id, MessageRole::User, "hoi").unwrap();
        assert!(matches!(flag(&store, &user.id, Feedback::NotHelpful), Err(AppError::Validation { .. })));
    }

    #[test]
    fn helpful_flag_has_no_curation_state() {
        let (_dir, store) = temp_store();
        let session = store.create_session().unwrap();
        let bot = store.append_message(&session.id, MessageRole::Bot, "Goed antwoord").unwrap();
        let msg = flag(&store, &bot.id, Feedback::Helpful).unwrap();
        assert_eq!(msg.curation_state, None);
        assert!(matches!(mark_handled(&store, &bot.id), Err(AppError::Validation { .. })));
    }

    #[test]
    fn rules_commit_appends() {
        let (_dir, store) = temp_store();
        store.update_settings(None, Some("Wees warm.")).unwrap();
        let outcome = commit(&store, &CurationSuggestion::rules("Noem nooit een tijdslimiet voor rouw.")).unwrap();
        match outcome {
            CommitOutcome::Rules(update) => {
                assert_eq!(update.rules, "Wees warm.\nNoem nooit een tijdslimiet voor rouw.");
            }
            other => panic!("expected rules outcome, got {other:?}"),
        }
    }

    #[test]
    fn knowledge_commit_requires_category() {
        let (_dir, store) = temp_store();
        let err = commit(&store, &CurationSuggestion::knowledge("Vraag?", "Antwoord.", "  ")).unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field, "category"),
            other => panic!("unexpected {other}"),
        }
        assert_eq!(store.count_active_entries().unwrap(), 0);
    }

    #[test]
    fn commit_on_unanalyzed_hand_edit_is_allowed() {
        let (_dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        let mut s = CurationSuggestion::knowledge("Hoe reset ik mijn wachtwoord?", "Via het inlogscherm.", "Account");
        s.message_id = Some(bot.id.clone());
        commit(&store, &s).unwrap();
        assert_eq!(store.get_message(&bot.id).unwrap().curation_state, Some(CurationState::Committed));
        assert!(matches!(commit(&store, &s), Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn archived_message_cannot_be_reflagged() {
        let (_dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        let mut s = CurationSuggestion::knowledge("Hoe reset ik mijn wachtwoord?", "Via het inlogscherm.", "Account");
        s.message_id = Some(bot.id.clone());
        commit(&store, &s).unwrap();

        for verdict in [Feedback::NotHelpful, Feedback::Helpful, Feedback::None] {
            assert!(matches!(flag(&store, &bot.id, verdict), Err(AppError::InvalidTransition(_))));
        }
        let msg = store.get_message(&bot.id).unwrap();
        assert_eq!(msg.curation_state, Some(CurationState::Committed));
        assert_eq!(msg.feedback, Feedback::NotHelpful);
        assert!(matches!(commit(&store, &s), Err(AppError::InvalidTransition(_))));
        assert_eq!(store.count_active_entries().unwrap(), 1);
    }

    #[test]
    fn verdict_change_keeps_in_progress_analysis() {
        let (_dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        store.set_curation_state(&bot.id, CurationState::Analyzed).unwrap();
        assert!(matches!(flag(&store, &bot.id, Feedback::Helpful), Err(AppError::InvalidTransition(_))));
        assert_eq!(store.get_message(&bot.id).unwrap().curation_state, Some(CurationState::Analyzed));
    }

    #[test]
    fn flagged_message_verdict_can_still_change() {
        let (_dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        assert_eq!(flag(&store, &bot.id, Feedback::NotHelpful).unwrap().curation_state, Some(CurationState::Flagged));
        let msg = flag(&store, &bot.id, Feedback::Helpful).unwrap();
        assert_eq!(msg.curation_state, None);
        assert_eq!(msg.feedback, Feedback::Helpful);
    }

    #[test]
    fn alternative_phrasing_collision_warns_once_per_entry() {
        let (_dir, store) = temp_store();
        let mut existing = NewKnowledgeEntry::new("Hoe verwijder ik mijn account?", "Via instellingen.", "Account");
        existing.alternative_questions = vec!["Account opheffen".into()];
        let existing = store.insert_entry(existing).unwrap();

        let warnings = phrasing_duplicates(
            &store,
            "account",
            ["Waar vind ik mijn facturen?", "hoe verwijder ik mijn account", "account opheffen"],
            None,
        )
        .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].entry_id, existing.id);

        let none = phrasing_duplicates(&store, "Account", ["Waar vind ik mijn facturen?"], None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn update_target_excludes_itself_from_warnings() {
        let (_dir, store) = temp_store();
        let entry = store
            .insert_entry(NewKnowledgeEntry::new("Hoe reset ik mijn wachtwoord?", "Oud.", "Account"))
            .unwrap();
        let mut s = CurationSuggestion::knowledge("Hoe reset ik mijn wachtwoord?", "Nieuw.", "Account");
        s.target_entry_id = Some(entry.id.clone());
        match commit(&store, &s).unwrap() {
            CommitOutcome::Knowledge { entry: updated, created, warnings } => {
                assert!(!created);
                assert!(warnings.is_empty());
                assert_eq!(updated.id, entry.id);
                assert_eq!(updated.answer, "Nieuw.");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.count_active_entries().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_analysis_keeps_state() {
        let (dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        let scripted = ScriptedProvider::new();
        scripted.push_reply("dit is geen json");
        let llm = LlmProvider::Scripted(scripted);

        let err = analyze(&store, &llm, dir.path(), &bot.id).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert_eq!(store.get_message(&bot.id).unwrap().curation_state, Some(CurationState::Flagged));
    }

    #[test]
    fn discard_then_commit_rejected() {
        let (_dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        assert_eq!(discard(&store, &bot.id).unwrap(), CurationState::Discarded);
        let mut s = CurationSuggestion::rules("x");
        s.message_id = Some(bot.id.clone());
        assert!(matches!(commit(&store, &s), Err(AppError::InvalidTransition(_))));
        assert_eq!(store.get_settings().unwrap().rules, "");
    }

    #[test]
    fn delete_flagged_removes_message() {
        let (_dir, store) = temp_store();
        let bot = flagged_exchange(&store);
        delete_flagged(&store, &bot.id).unwrap();
        assert!(store.list_flagged(Feedback::NotHelpful, true).unwrap().is_empty());
    }
}
