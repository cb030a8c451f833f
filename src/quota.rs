//! Quota gate consulted before a chat turn runs.
//!
//! Subscription and rate decisions live outside this crate; the pipeline
//! only asks yes/no per actor.

use std::collections::HashMap;
use std::sync::Mutex;

pub trait QuotaGate: Send + Sync {
    fn allow(&self, actor: &str) -> bool;
}

/// Allows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl QuotaGate for Unlimited {
    fn allow(&self, _actor: &str) -> bool {
        true
    }
}

/// Allows each actor a fixed number of turns for the life of the process.
#[derive(Debug)]
pub struct FixedAllowance {
    per_actor: u32,
    used: Mutex<HashMap<String, u32>>,
}

impl FixedAllowance {
    pub fn new(per_actor: u32) -> Self {
        Self { per_actor, used: Mutex::new(HashMap::new()) }
    }
}

impl QuotaGate for FixedAllowance {
    fn allow(&self, actor: &str) -> bool {
        let mut used = self.used.lock().unwrap_or_else(|p| p.into_inner());
        let count = used.entry(actor.to_string()).or_insert(0);
        if *count >= self.per_actor {
            return false;
        }
        *count += 1;
        true
    }
}
