//! [`BotService`]: the operations exposed to the chat UI and the admin UI.
//!
//! Cheap to clone and shared by every axum handler. Blocking store work runs
//! on the blocking pool via [`Store::blocking`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::curation::{self, CommitOutcome, CurationState, CurationSuggestion, DuplicateWarning};
use crate::error::AppError;
use crate::ingest::Ingestor;
use crate::llm::{LlmProvider, providers};
use crate::phrasing::{PhrasingGenerator, PhrasingOutcome};
use crate::pipeline::Pipeline;
use crate::quota::{QuotaGate, Unlimited};
use crate::retrieval::{MatchHints, MatchResult, Matcher};
use crate::store::{
    BotSettings, ChatMessage, ChatSession, EntryFilter, Feedback, FlaggedMessage, KnowledgeEntry,
    KnowledgeUpdate, NewKnowledgeEntry, SourceDocument, Store,
};
use crate::unanswered::{Miner, UnansweredGroup};

/// An entry write plus any near-duplicates it may have created.
#[derive(Debug, Clone, Serialize)]
pub struct EntryWrite {
    pub entry: KnowledgeEntry,
    pub warnings: Vec<DuplicateWarning>,
}

struct Inner {
    store: Store,
    llm: LlmProvider,
    pipeline: Pipeline,
    matcher: Matcher,
    miner: Miner,
    phrasing: PhrasingGenerator,
    ingestor: Ingestor,
    prompts_dir: PathBuf,
}

#[derive(Clone)]
pub struct BotService {
    inner: Arc<Inner>,
}

impl BotService {
    pub fn new(
        config: &Config,
        store: Store,
        llm: LlmProvider,
        quota: Arc<dyn QuotaGate>,
    ) -> Result<Self, AppError> {
        let matcher = Matcher::new(config.retrieval.clone());
        let pipeline = Pipeline::new(
            store.clone(),
            llm.clone(),
            matcher.clone(),
            quota,
            config.prompts_dir.clone(),
            config.conversation.window,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                llm,
                pipeline,
                matcher,
                miner: Miner::new(config.unanswered.clone()),
                phrasing: PhrasingGenerator::new(config.phrasing.clone()),
                ingestor: Ingestor::new()?,
                prompts_dir: config.prompts_dir.clone(),
            }),
        })
    }

    /// Open the store in `config.work_dir`, build the configured provider
    /// and allow every request.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let store = Store::open(&config.db_path(), &config.sources_dir())?;
        let llm = providers::build(&config.llm, config.llm_api_key.clone())
            .map_err(|e| AppError::Config(format!("llm: {e}")))?;
        info!(provider = llm.name(), work_dir = %config.work_dir.display(), "service: ready");
        Self::new(config, store, llm, Arc::new(Unlimited))
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.llm.name()
    }

    // ── Chat ──────────────────────────────────────────────────────────

    pub async fn match_and_respond(&self, session_id: &str, utterance: &str) -> Result<ChatMessage, AppError> {
        self.inner.pipeline.match_and_respond(session_id, utterance).await
    }

    pub async fn create_session(&self) -> Result<ChatSession, AppError> {
        self.inner.store.blocking("create session", |s| s.create_session()).await
    }

    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let id = session_id.to_string();
        self.inner.store.blocking("session messages", move |s| s.list_messages(&id)).await
    }

    /// Rank without side effects (no usage bump, no unanswered row).
    pub async fn preview_match(&self, utterance: &str, hints: MatchHints) -> Result<MatchResult, AppError> {
        let matcher = self.inner.matcher.clone();
        let text = utterance.to_string();
        self.inner
            .store
            .blocking("preview match", move |s| {
                let entries = s.list_active_entries()?;
                let sources = s.list_active_sources()?;
                Ok(matcher.rank(&text, &hints, &entries, &sources))
            })
            .await
    }

    // ── Curation ──────────────────────────────────────────────────────

    pub async fn flag_message(&self, message_id: &str, verdict: Feedback) -> Result<ChatMessage, AppError> {
        let id = message_id.to_string();
        self.inner.store.blocking("flag message", move |s| curation::flag(s, &id, verdict)).await
    }

    pub async fn list_flagged(
        &self,
        verdict: Feedback,
        include_archived: bool,
    ) -> Result<Vec<FlaggedMessage>, AppError> {
        self.inner
            .store
            .blocking("list flagged", move |s| s.list_flagged(verdict, include_archived))
            .await
    }

    /// Bot answers operators marked helpful. Read-only.
    pub async fn good_examples(&self) -> Result<Vec<FlaggedMessage>, AppError> {
        self.list_flagged(Feedback::Helpful, true).await
    }

    pub async fn analyze_flagged_message(&self, message_id: &str) -> Result<CurationSuggestion, AppError> {
        curation::analyze(&self.inner.store, &self.inner.llm, &self.inner.prompts_dir, message_id).await
    }

    pub async fn commit_suggestion(&self, suggestion: CurationSuggestion) -> Result<CommitOutcome, AppError> {
        self.inner
            .store
            .blocking("commit suggestion", move |s| curation::commit(s, &suggestion))
            .await
    }

    pub async fn discard_suggestion(&self, message_id: &str) -> Result<CurationState, AppError> {
        let id = message_id.to_string();
        self.inner.store.blocking("discard suggestion", move |s| curation::discard(s, &id)).await
    }

    pub async fn mark_handled(&self, message_id: &str) -> Result<CurationState, AppError> {
        let id = message_id.to_string();
        self.inner.store.blocking("mark handled", move |s| curation::mark_handled(s, &id)).await
    }

    pub async fn delete_flagged(&self, message_id: &str) -> Result<(), AppError> {
        let id = message_id.to_string();
        self.inner.store.blocking("delete flagged", move |s| curation::delete_flagged(s, &id)).await
    }

    pub async fn preview_duplicates(
        &self,
        category: &str,
        question: &str,
        exclude_id: Option<String>,
    ) -> Result<Vec<DuplicateWarning>, AppError> {
        let (category, question) = (category.to_string(), question.to_string());
        self.inner
            .store
            .blocking("preview duplicates", move |s| {
                curation::preview_duplicates(s, &category, &question, exclude_id.as_deref())
            })
            .await
    }

    // ── Unanswered questions ──────────────────────────────────────────

    pub async fn list_unanswered_groups(&self, limit: usize) -> Result<Vec<UnansweredGroup>, AppError> {
        let miner = self.inner.miner.clone();
        self.inner.store.blocking("list unanswered", move |s| miner.list_groups(s, limit)).await
    }

    pub async fn dismiss_unanswered_group(&self, key: &str) -> Result<usize, AppError> {
        let (miner, key) = (self.inner.miner.clone(), key.to_string());
        self.inner.store.blocking("dismiss unanswered", move |s| miner.dismiss(s, &key)).await
    }

    pub async fn draft_from_group(&self, key: &str) -> Result<NewKnowledgeEntry, AppError> {
        let (miner, key) = (self.inner.miner.clone(), key.to_string());
        self.inner.store.blocking("draft from group", move |s| miner.draft(s, &key)).await
    }

    pub async fn convert_group(&self, key: &str, answer: &str, category: &str) -> Result<KnowledgeEntry, AppError> {
        let miner = self.inner.miner.clone();
        let (key, answer, category) = (key.to_string(), answer.to_string(), category.to_string());
        self.inner
            .store
            .blocking("convert group", move |s| miner.convert(s, &key, &answer, &category))
            .await
    }

    // ── Knowledge ─────────────────────────────────────────────────────

    pub async fn create_entry(&self, new: NewKnowledgeEntry) -> Result<EntryWrite, AppError> {
        self.inner
            .store
            .blocking("create entry", move |s| {
                new.validate()?;
                let phrasings = std::iter::once(new.question.as_str())
                    .chain(new.alternative_questions.iter().map(String::as_str));
                let warnings = curation::phrasing_duplicates(s, &new.category, phrasings, None)?;
                Ok(EntryWrite { entry: s.insert_entry(new)?, warnings })
            })
            .await
    }

    pub async fn update_entry(&self, id: &str, update: KnowledgeUpdate) -> Result<EntryWrite, AppError> {
        let id = id.to_string();
        self.inner
            .store
            .blocking("update entry", move |s| {
                let entry = s.update_entry(&id, update)?;
                let warnings =
                    curation::phrasing_duplicates(s, &entry.category, entry.phrasings(), Some(&entry.id))?;
                Ok(EntryWrite { entry, warnings })
            })
            .await
    }

    pub async fn get_entry(&self, id: &str) -> Result<KnowledgeEntry, AppError> {
        let id = id.to_string();
        self.inner.store.blocking("get entry", move |s| s.get_entry(&id)).await
    }

    pub async fn list_entries(&self, filter: EntryFilter) -> Result<Vec<KnowledgeEntry>, AppError> {
        self.inner.store.blocking("list entries", move |s| s.list_entries(&filter)).await
    }

    pub async fn delete_entry(&self, id: &str) -> Result<(), AppError> {
        let id = id.to_string();
        self.inner.store.blocking("delete entry", move |s| s.delete_entry(&id)).await
    }

    pub async fn generate_alternative_phrasings(&self, entry_id: &str) -> Result<PhrasingOutcome, AppError> {
        self.inner
            .phrasing
            .generate(&self.inner.store, &self.inner.llm, &self.inner.prompts_dir, entry_id)
            .await
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub async fn get_settings(&self) -> Result<BotSettings, AppError> {
        self.inner.store.blocking("get settings", |s| s.get_settings()).await
    }

    pub async fn update_settings(
        &self,
        knowledge: Option<String>,
        rules: Option<String>,
    ) -> Result<BotSettings, AppError> {
        self.inner
            .store
            .blocking("update settings", move |s| {
                s.update_settings(knowledge.as_deref(), rules.as_deref())
            })
            .await
    }

    // ── Sources ───────────────────────────────────────────────────────

    pub async fn ingest_url(&self, url: &str, title: Option<String>) -> Result<SourceDocument, AppError> {
        self.inner.ingestor.ingest_url(&self.inner.store, url, title).await
    }

    pub async fn ingest_pdf(&self, title: &str, bytes: Vec<u8>) -> Result<SourceDocument, AppError> {
        self.inner.ingestor.ingest_pdf(&self.inner.store, title, bytes).await
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceDocument>, AppError> {
        self.inner.store.blocking("list sources", |s| s.list_sources()).await
    }

    pub async fn set_source_active(&self, id: &str, active: bool) -> Result<SourceDocument, AppError> {
        let id = id.to_string();
        self.inner.store.blocking("toggle source", move |s| s.set_source_active(&id, active)).await
    }

    pub async fn delete_source(&self, id: &str) -> Result<SourceDocument, AppError> {
        let id = id.to_string();
        self.inner.store.blocking("delete source", move |s| s.delete_source(&id)).await
    }
}
