//! Curation loop: flag → analyze → edit → commit.

mod common;

use rouw_bot::curation::{CommitOutcome, CurationState, TargetType};
use rouw_bot::error::AppError;
use rouw_bot::store::{EntryFilter, Feedback, KnowledgeUpdate, NewKnowledgeEntry};

const KNOWLEDGE_REPLY: &str = r#"{"problem_summary": "De bot kon niet uitleggen hoe je je account verwijdert.",
"target_type": "knowledge", "rationale": "Feitelijke vraag zonder antwoord in de kennisbank.",
"proposed_text": "", "proposed_question": "Hoe verwijder ik mijn account?",
"proposed_answer": "Ga naar Instellingen > Account > Verwijderen.", "proposed_category": "Techniek"}"#;

const RULES_REPLY: &str = r#"Sure. {"problem_summary": "Te zakelijk.", "target_type": "rules",
"rationale": "Toon", "proposed_text": "Begin altijd met erkenning van het verlies.",
"proposed_question": "", "proposed_answer": "", "proposed_category": ""}"#;

#[tokio::test]
async fn flag_analyze_edit_commit_creates_entry() {
    let (_tmp, service, scripted) = common::scripted_service();
    scripted.push_reply("Dat weet ik helaas niet.");
    let bot = service.match_and_respond("s1", "Hoe verwijder ik mijn account?").await.unwrap();

    let flagged = service.flag_message(&bot.id, Feedback::NotHelpful).await.unwrap();
    assert_eq!(flagged.curation_state, Some(CurationState::Flagged));

    let listed = service.list_flagged(Feedback::NotHelpful, false).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].question.as_deref(), Some("Hoe verwijder ik mijn account?"));

    scripted.push_reply(KNOWLEDGE_REPLY);
    let mut suggestion = service.analyze_flagged_message(&bot.id).await.unwrap();
    assert_eq!(suggestion.target_type, TargetType::Knowledge);
    assert_eq!(suggestion.proposed_category, "Techniek");
    assert!(scripted.calls().last().unwrap().system.contains("Dat weet ik helaas niet."));

    suggestion.proposed_category = "Account".into();
    let outcome = service.commit_suggestion(suggestion).await.unwrap();
    let entry = match outcome {
        CommitOutcome::Knowledge { entry, created, warnings } => {
            assert!(created);
            assert!(warnings.is_empty());
            entry
        }
        other => panic!("expected knowledge outcome, got {other:?}"),
    };
    assert_eq!(entry.category, "Account");
    assert!(entry.is_active);
    assert_eq!(entry.usage_count, 0);

    let account = service
        .list_entries(EntryFilter { active_only: true, category: Some("Account".into()) })
        .await
        .unwrap();
    assert_eq!(account.len(), 1);

    let after = service.store().get_message(&bot.id).unwrap();
    assert_eq!(after.content, "Dat weet ik helaas niet.");
    assert_eq!(after.curation_state, Some(CurationState::Committed));
    assert!(service.list_flagged(Feedback::NotHelpful, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn rules_suggestion_appends_to_rules() {
    let (_tmp, service, scripted) = common::scripted_service();
    service.update_settings(None, Some("Wees warm.".into())).await.unwrap();
    scripted.push_reply("Uw verzoek is genoteerd.");
    let bot = service.match_and_respond("s1", "Mijn vader is overleden.").await.unwrap();
    service.flag_message(&bot.id, Feedback::NotHelpful).await.unwrap();

    scripted.push_reply(RULES_REPLY);
    let suggestion = service.analyze_flagged_message(&bot.id).await.unwrap();
    assert_eq!(suggestion.target_type, TargetType::Rules);

    match service.commit_suggestion(suggestion).await.unwrap() {
        CommitOutcome::Rules(update) => {
            assert_eq!(update.previous, "Wees warm.");
            assert!(update.rules.starts_with("Wees warm.\n"));
            assert!(update.rules.ends_with("Begin altijd met erkenning van het verlies."));
        }
        other => panic!("expected rules outcome, got {other:?}"),
    }
    assert_eq!(service.store().get_message(&bot.id).unwrap().curation_state, Some(CurationState::Committed));
}

#[tokio::test]
async fn duplicate_warnings_do_not_block() {
    let (_tmp, service, scripted) = common::scripted_service();
    service
        .create_entry(NewKnowledgeEntry::new("Hoe verwijder ik mijn account?", "Via instellingen.", "Account"))
        .await
        .unwrap();

    scripted.push_reply("Geen idee.");
    let bot = service.match_and_respond("s1", "Kan ik mijn profiel wissen?").await.unwrap();
    service.flag_message(&bot.id, Feedback::NotHelpful).await.unwrap();
    scripted.push_reply(KNOWLEDGE_REPLY);
    let mut suggestion = service.analyze_flagged_message(&bot.id).await.unwrap();
    suggestion.proposed_category = "account".into();

    match service.commit_suggestion(suggestion).await.unwrap() {
        CommitOutcome::Knowledge { warnings, created, .. } => {
            assert!(created);
            assert_eq!(warnings.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(service.list_entries(EntryFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn helpful_answers_are_good_examples_only() {
    let (_tmp, service, scripted) = common::scripted_service();
    scripted.push_reply("Wat fijn dat je het deelt.");
    let bot = service.match_and_respond("s1", "Ik wil over mijn moeder praten.").await.unwrap();
    service.flag_message(&bot.id, Feedback::Helpful).await.unwrap();

    let good = service.good_examples().await.unwrap();
    assert_eq!(good.len(), 1);
    assert!(service.list_flagged(Feedback::NotHelpful, true).await.unwrap().is_empty());
    assert!(matches!(
        service.analyze_flagged_message(&bot.id).await,
        Err(AppError::Validation { .. })
    ));
}

#[tokio::test]
async fn mark_handled_archives_and_delete_removes() {
    let (_tmp, service, scripted) = common::scripted_service();
    scripted.push_reply("Eerste.").push_reply("Tweede.");
    let first = service.match_and_respond("s1", "een").await.unwrap();
    let second = service.match_and_respond("s1", "twee").await.unwrap();
    service.flag_message(&first.id, Feedback::NotHelpful).await.unwrap();
    service.flag_message(&second.id, Feedback::NotHelpful).await.unwrap();

    assert_eq!(service.mark_handled(&first.id).await.unwrap(), CurationState::Handled);
    assert_eq!(service.list_flagged(Feedback::NotHelpful, false).await.unwrap().len(), 1);
    assert_eq!(service.list_flagged(Feedback::NotHelpful, true).await.unwrap().len(), 2);

    service.delete_flagged(&second.id).await.unwrap();
    assert!(matches!(service.store().get_message(&second.id), Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn committed_message_cannot_be_reopened() {
    let (_tmp, service, scripted) = common::scripted_service();
    scripted.push_reply("Dat weet ik helaas niet.");
    let bot = service.match_and_respond("s1", "Hoe verwijder ik mijn account?").await.unwrap();
    service.flag_message(&bot.id, Feedback::NotHelpful).await.unwrap();
    scripted.push_reply(KNOWLEDGE_REPLY);
    let suggestion = service.analyze_flagged_message(&bot.id).await.unwrap();
    service.commit_suggestion(suggestion.clone()).await.unwrap();

    assert!(matches!(
        service.flag_message(&bot.id, Feedback::NotHelpful).await,
        Err(AppError::InvalidTransition(_))
    ));
    assert!(matches!(
        service.commit_suggestion(suggestion).await,
        Err(AppError::InvalidTransition(_))
    ));
    assert_eq!(service.store().get_message(&bot.id).unwrap().curation_state, Some(CurationState::Committed));
    assert_eq!(service.list_entries(EntryFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn alternative_questions_are_checked_for_duplicates() {
    let (_tmp, service, _scripted) = common::scripted_service();
    let first = service
        .create_entry(NewKnowledgeEntry::new("Hoe verwijder ik mijn account?", "Via instellingen.", "Account"))
        .await
        .unwrap()
        .entry;

    let mut new = NewKnowledgeEntry::new("Waar vind ik mijn facturen?", "Onder Betalingen.", "Account");
    new.alternative_questions = vec!["Hoe verwijder ik mijn account".into()];
    let written = service.create_entry(new).await.unwrap();
    assert_eq!(written.warnings.len(), 1);
    assert_eq!(written.warnings[0].entry_id, first.id);

    let third = service
        .create_entry(NewKnowledgeEntry::new("Kan ik mijn naam wijzigen?", "Via profiel.", "Account"))
        .await
        .unwrap();
    assert!(third.warnings.is_empty());
    let updated = service
        .update_entry(
            &third.entry.id,
            KnowledgeUpdate {
                alternative_questions: Some(vec!["hoe verwijder ik mijn account?".into()]),
                ..KnowledgeUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.warnings.iter().any(|w| w.entry_id == first.id));
    assert_eq!(service.list_entries(EntryFilter::default()).await.unwrap().len(), 3);
}
