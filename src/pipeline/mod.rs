//! Response pipeline: one user utterance in, one persisted bot reply out.
//!
//! ```text
//! quota ─▶ log user turn ─▶ Matcher ─▶ assemble context ─▶ generate ─▶ log bot turn
//!                              │
//!                              └─ miss ─▶ unanswered row (alongside generation)
//! ```

mod assembler;
pub mod prompt;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::llm::LlmProvider;
use crate::quota::QuotaGate;
use crate::retrieval::{MatchHints, MatchResult, Matcher};
use crate::store::{ChatMessage, MessageRole, Store};

pub use assembler::{conversation_window, format_entries, format_excerpts, system_context};

#[derive(Clone)]
pub struct Pipeline {
    store: Store,
    llm: LlmProvider,
    matcher: Matcher,
    quota: Arc<dyn QuotaGate>,
    prompts_dir: PathBuf,
    window: usize,
}

impl Pipeline {
    pub fn new(
        store: Store,
        llm: LlmProvider,
        matcher: Matcher,
        quota: Arc<dyn QuotaGate>,
        prompts_dir: PathBuf,
        window: usize,
    ) -> Self {
        Self { store, llm, matcher, quota, prompts_dir, window }
    }

    /// Answer `utterance` in `session_id` and return the stored bot message.
    ///
    /// The user message is persisted before generation and stays even when
    /// generation fails. The bot message is persisted only on success. When
    /// the Matcher misses, exactly one unanswered row has been written by the
    /// time this returns.
    pub async fn match_and_respond(
        &self,
        session_id: &str,
        utterance: &str,
    ) -> Result<ChatMessage, AppError> {
        let utterance = utterance.trim().to_string();
        if utterance.is_empty() {
            return Err(AppError::validation("utterance", "must not be empty"));
        }
        if !self.quota.allow(session_id) {
            info!(session_id, "pipeline: quota denied");
            return Err(AppError::RateLimited);
        }

        let sid = session_id.to_string();
        let text = utterance.clone();
        let settings = self
            .store
            .blocking("log user turn", move |s| {
                s.ensure_session(&sid)?;
                s.append_message(&sid, MessageRole::User, &text)?;
                s.get_settings()
            })
            .await?;

        let matcher = self.matcher.clone();
        let text = utterance.clone();
        let (matched, store_ok) = match self
            .store
            .blocking("match", move |s| matcher.run(s, &text, &MatchHints::default()))
            .await
        {
            Ok(m) => (m, true),
            Err(e) => {
                warn!(session_id, error = %e, "pipeline: matcher could not read the store");
                (MatchResult::default(), false)
            }
        };
        let miss = matched.is_miss();
        debug!(session_id, miss, entries = matched.entries.len(), "pipeline: matched");

        let sid = session_id.to_string();
        let n = self.window;
        let history = self
            .store
            .blocking("load window", move |s| s.last_messages(&sid, n))
            .await?;

        let system = system_context(&self.prompts_dir, &settings, &matched);
        let window = conversation_window(&history);

        let generation = self.llm.generate(&system, &window);
        let record_miss = async {
            if !(miss && store_ok) {
                return;
            }
            let sid = session_id.to_string();
            let text = utterance.clone();
            if let Err(e) = self
                .store
                .blocking("record unanswered", move |s| s.record_unanswered(&text, &sid))
                .await
            {
                warn!(session_id, error = %e, "pipeline: could not record unanswered question");
            }
        };
        let (reply, ()) = tokio::join!(generation, record_miss);

        let reply = reply?;
        if reply.trim().is_empty() {
            return Err(AppError::Generation("provider returned an empty reply".into()));
        }

        let sid = session_id.to_string();
        let bot = self
            .store
            .blocking("log bot turn", move |s| s.append_message(&sid, MessageRole::Bot, reply.trim()))
            .await?;
        info!(session_id, message_id = %bot.id, miss, "pipeline: replied");
        Ok(bot)
    }
}
