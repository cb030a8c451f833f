//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `ROUW_WORK_DIR` and `ROUW_LOG_LEVEL` env overrides.
//!
//! # Module layout
//!
//! - **types**: public configuration structs (`Config`, `RetrievalConfig`, …).
//! - **raw**: raw TOML deserialization types; kept private.
//! - **load**: `load`, `load_from`, `expand_home`, base-chain merging.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from};
pub use types::*;
