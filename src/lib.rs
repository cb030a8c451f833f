//! rouw-bot: knowledge-augmented replies for a grief-support chatbot, and
//! the operator loop that turns bad answers and unanswered questions back
//! into curated knowledge.

pub mod api;
pub mod config;
pub mod curation;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logger;
pub mod phrasing;
pub mod pipeline;
pub mod quota;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod unanswered;
