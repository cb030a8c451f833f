//! Scripted provider: replays a queue of canned replies and records every
//! request it receives.
//!
//! Lets curation analysis, phrasing generation and failure paths run
//! deterministically without a network. Clones share the same queue and log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::{ChatTurn, ProviderError};

/// One recorded `generate` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub window: Vec<ChatTurn>,
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, String>>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.lock().replies.push_back(Ok(text.into()));
        self
    }

    /// Queue a provider failure.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.lock().replies.push_back(Err(message.into()));
        self
    }

    /// All calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub async fn generate(&self, system: &str, window: &[ChatTurn]) -> Result<String, ProviderError> {
        let mut script = self.lock();
        script.calls.push(RecordedCall { system: system.to_string(), window: window.to_vec() });
        match script.replies.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ProviderError::Request(message)),
            None => Err(ProviderError::Request("scripted provider has no reply queued".into())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // A panic while holding the lock only happens inside a failing test;
        // the script data is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
