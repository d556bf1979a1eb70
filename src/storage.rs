//! Durable streak state, one document per scope.
//!
//! A store hands out the full counter map of a scope and takes it back as a
//! full overwrite. The Postgres implementation lives in [`crate::db`];
//! [`MemoryStateStore`] keeps everything in process.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ScopeKey, StreakMap};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Counters persisted for `scope`, empty if the scope was never written.
    async fn get(&self, scope: &ScopeKey) -> Result<StreakMap>;

    /// Replace the counters of `scope` with `streaks`.
    async fn put(&self, scope: &ScopeKey, streaks: &StreakMap) -> Result<()>;
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    scopes: Mutex<HashMap<ScopeKey, StreakMap>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes written so far.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.keys().copied().collect()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, scope: &ScopeKey) -> Result<StreakMap> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scopes.get(scope).cloned().unwrap_or_default())
    }

    async fn put(&self, scope: &ScopeKey, streaks: &StreakMap) -> Result<()> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.insert(*scope, streaks.clone());
        Ok(())
    }
}
