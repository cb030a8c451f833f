//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use rouw_bot::config::Config;
use rouw_bot::llm::LlmProvider;
use rouw_bot::llm::providers::dummy::DummyProvider;
use rouw_bot::llm::providers::scripted::ScriptedProvider;
use rouw_bot::quota::{QuotaGate, Unlimited};
use rouw_bot::service::BotService;
use rouw_bot::store::Store;

pub fn service_with(llm: LlmProvider, quota: Arc<dyn QuotaGate>) -> (TempDir, BotService) {
    let tmp = TempDir::new().expect("tempdir");
    let config = Config::minimal(tmp.path());
    let store = Store::open(&config.db_path(), &config.sources_dir()).expect("open store");
    let service = BotService::new(&config, store, llm, quota).expect("service");
    (tmp, service)
}

/// Service backed by the echoing dummy provider.
pub fn dummy_service() -> (TempDir, BotService) {
    service_with(LlmProvider::Dummy(DummyProvider), Arc::new(Unlimited))
}

/// Service backed by a scripted provider; queue replies on the returned handle.
pub fn scripted_service() -> (TempDir, BotService, ScriptedProvider) {
    let scripted = ScriptedProvider::new();
    let (tmp, service) = service_with(LlmProvider::Scripted(scripted.clone()), Arc::new(Unlimited));
    (tmp, service, scripted)
}
