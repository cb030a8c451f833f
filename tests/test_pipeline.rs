//! End-to-end tests for `match_and_respond`.

mod common;

use std::sync::Arc;

use rouw_bot::error::AppError;
use rouw_bot::llm::LlmProvider;
use rouw_bot::llm::TurnRole;
use rouw_bot::llm::providers::dummy::DummyProvider;
use rouw_bot::quota::FixedAllowance;
use rouw_bot::store::{MessageRole, NewKnowledgeEntry};

fn password_entry() -> NewKnowledgeEntry {
    NewKnowledgeEntry {
        alternative_questions: vec!["Hoe reset ik mijn wachtwoord?".into()],
        ..NewKnowledgeEntry::new(
            "Ik ben mijn wachtwoord vergeten",
            "Klik op het inlogscherm op 'wachtwoord vergeten' en volg de mail.",
            "Account",
        )
    }
}

#[tokio::test]
async fn known_question_hits_and_counts_usage() {
    let (_tmp, service) = common::dummy_service();
    let entry = service.create_entry(password_entry()).await.unwrap().entry;

    let bot = service.match_and_respond("s1", "Hoe reset ik mijn wachtwoord?").await.unwrap();
    assert_eq!(bot.role, MessageRole::Bot);
    assert_eq!(bot.content, "[echo] Hoe reset ik mijn wachtwoord?");

    assert_eq!(service.get_entry(&entry.id).await.unwrap().usage_count, 1);
    assert!(service.list_unanswered_groups(10).await.unwrap().is_empty());

    let history = service.session_messages("s1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[1].id, bot.id);
}

#[tokio::test]
async fn gibberish_misses_and_is_recorded_once() {
    let (_tmp, service) = common::dummy_service();
    service.create_entry(password_entry()).await.unwrap();

    let utterance = "xyz totally unrelated gibberish 12345";
    service.match_and_respond("s1", utterance).await.unwrap();

    let rows = service.store().list_unanswered().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_question, utterance);
    assert_eq!(rows[0].session_id, "s1");
}

#[tokio::test]
async fn generation_failure_keeps_user_turn_only() {
    let (_tmp, service, scripted) = common::scripted_service();
    scripted.push_failure("HTTP 503");

    let err = service.match_and_respond("s1", "Mag ik nog steeds huilen?").await.unwrap_err();
    assert!(matches!(err, AppError::Generation(_)));
    assert!(err.is_retryable());

    let history = service.session_messages("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, MessageRole::User);
    // The miss is still recorded even though generation failed.
    assert_eq!(service.store().list_unanswered().unwrap().len(), 1);
}

#[tokio::test]
async fn quota_denial_persists_nothing() {
    let (_tmp, service) = common::service_with(
        LlmProvider::Dummy(DummyProvider),
        Arc::new(FixedAllowance::new(0)),
    );
    let err = service.match_and_respond("s1", "Hallo").await.unwrap_err();
    assert!(matches!(err, AppError::RateLimited));
    assert!(service.session_messages("s1").await.unwrap().is_empty());
    assert!(service.store().list_unanswered().unwrap().is_empty());
}

#[tokio::test]
async fn context_carries_rules_matches_and_bounded_window() {
    let (_tmp, service, scripted) = common::scripted_service();
    service.update_settings(Some("Wij zijn stichting Rouw.".into()), Some("Wees warm.".into())).await.unwrap();
    service.create_entry(password_entry()).await.unwrap();

    for i in 0..6 {
        scripted.push_reply(format!("antwoord {i}"));
        service.match_and_respond("s1", &format!("bericht nummer {i}")).await.unwrap();
    }
    scripted.push_reply("Zo reset je het.");
    service.match_and_respond("s1", "Hoe reset ik mijn wachtwoord?").await.unwrap();

    let calls = scripted.calls();
    let last = calls.last().unwrap();
    assert!(last.system.contains("Wij zijn stichting Rouw."));
    assert!(last.system.contains("Wees warm."));
    assert!(last.system.contains("wachtwoord vergeten"));
    assert_eq!(last.window.len(), 10);
    assert_eq!(last.window.last().unwrap().role, TurnRole::User);
    assert_eq!(last.window.last().unwrap().content, "Hoe reset ik mijn wachtwoord?");
    assert_eq!(service.session_messages("s1").await.unwrap().len(), 14);
}

#[tokio::test]
async fn empty_utterance_rejected() {
    let (_tmp, service) = common::dummy_service();
    let err = service.match_and_respond("s1", "   ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}
