//! Per-task indicator registry.
//!
//! One registry is created for each symbol computation and dropped with it.
//! Families running on different threads for the same symbol share it by
//! reference; `claim` is the atomic check-and-set that decides which of them
//! owns a column name.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

/// A column that was produced by more than one family. The first claimant
/// keeps the name; later values are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDuplicate {
    pub name: String,
    pub family: String,
}

#[derive(Debug, Default)]
struct State {
    claimed: HashSet<String>,
    skipped: Vec<SkippedDuplicate>,
}

#[derive(Debug, Default)]
pub struct IndicatorRegistry {
    state: Mutex<State>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A family that panics while holding the lock leaves the set intact,
    // so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically mark `name` as produced. Returns true for exactly one
    /// caller per name.
    pub fn claim(&self, name: &str) -> bool {
        self.lock().claimed.insert(name.to_string())
    }

    /// Like `claim`, but records the loss against `family`.
    pub fn claim_for(&self, family: &str, name: &str) -> bool {
        let mut state = self.lock();
        if state.claimed.insert(name.to_string()) {
            return true;
        }
        debug!(family, indicator = name, "skipping duplicate indicator");
        state.skipped.push(SkippedDuplicate {
            name: name.to_string(),
            family: family.to_string(),
        });
        false
    }

    /// True if `name` has not been produced yet. Only a hint under
    /// concurrency; use `claim` to actually take the name.
    pub fn should_compute(&self, name: &str) -> bool {
        !self.lock().claimed.contains(name)
    }

    pub fn mark_computed(&self, name: &str) {
        self.lock().claimed.insert(name.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().claimed.is_empty()
    }

    /// Duplicates discarded so far, in the order they were rejected.
    pub fn skipped(&self) -> Vec<SkippedDuplicate> {
        self.lock().skipped.clone()
    }
}
