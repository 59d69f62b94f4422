use chrono::Utc;
use dashmap::DashMap;
use lancedb::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use councildb_core::text::normalize_question;
use councildb_core::{Error, Result};

use crate::entry::{CacheEntry, CacheHit, CacheScope, CacheStats};
use crate::persist::CacheTable;
use crate::policy::BypassPolicy;

type Key = (CacheScope, String);

/// Normalized question → answer memory shared by every session.
///
/// Writes are serialized: the persisted row and the in-memory entry for a key
/// always come from the same `set`, the last one to take the write lock.
pub struct AnswerCache {
    entries: DashMap<Key, CacheEntry>,
    policy: BypassPolicy,
    table: Option<CacheTable>,
    writes: Mutex<()>,
}

impl AnswerCache {
    /// In-memory only.
    pub fn new(policy: BypassPolicy) -> Self {
        Self { entries: DashMap::new(), policy, table: None, writes: Mutex::new(()) }
    }

    /// Back the cache with a LanceDB table, loading any rows it already holds.
    pub async fn open(conn: Connection, table: &str, policy: BypassPolicy) -> anyhow::Result<Self> {
        let table = CacheTable::open(conn, table).await?;
        let entries = DashMap::new();
        for e in table.load().await? {
            entries.insert((e.scope.clone(), e.normalized.clone()), e);
        }
        info!(entries = entries.len(), "answer cache loaded");
        Ok(Self { entries, policy, table: Some(table), writes: Mutex::new(()) })
    }

    pub fn policy(&self) -> &BypassPolicy {
        &self.policy
    }

    pub fn should_bypass(&self, answer: &str) -> bool {
        self.policy.should_bypass(answer)
    }

    pub fn get(&self, scope: &CacheScope, question: &str) -> Option<String> {
        let key = normalize_question(question);
        if key.is_empty() {
            return None;
        }
        self.entries.get(&(scope.clone(), key)).map(|e| e.answer.clone())
    }

    pub async fn set(&self, scope: CacheScope, question: &str, answer: &str) -> Result<()> {
        let normalized = normalize_question(question);
        if normalized.is_empty() {
            return Err(Error::Validation("cannot cache an empty question".into()));
        }
        let entry = CacheEntry {
            scope: scope.clone(),
            normalized: normalized.clone(),
            question: question.to_string(),
            answer: answer.to_string(),
            created_at: Utc::now(),
        };
        let _guard = self.writes.lock().await;
        if let Some(table) = &self.table {
            table.upsert(&entry).await.map_err(|e| Error::Storage(e.to_string()))?;
        }
        debug!(scope = %scope, key = %normalized, "cached answer");
        self.entries.insert((scope, normalized), entry);
        Ok(())
    }

    pub fn get_user_answer(&self, user_id: &str, question: &str) -> Option<String> {
        self.get(&CacheScope::user(user_id), question)
    }

    pub fn get_global_answer(&self, question: &str) -> Option<String> {
        self.get(&CacheScope::Global, question)
    }

    pub async fn set_user_answer(&self, user_id: &str, question: &str, answer: &str) -> Result<()> {
        self.set(CacheScope::user(user_id), question, answer).await
    }

    pub async fn set_global_answer(&self, question: &str, answer: &str) -> Result<()> {
        self.set(CacheScope::Global, question, answer).await
    }

    /// User scope first, then global. Negative answers count as misses.
    pub fn lookup(&self, user_id: Option<&str>, question: &str) -> Option<CacheHit> {
        let scopes = user_id.map(CacheScope::user).into_iter().chain(std::iter::once(CacheScope::Global));
        for scope in scopes {
            match self.get(&scope, question) {
                Some(answer) if self.policy.should_bypass(&answer) => {
                    debug!(scope = %scope, "cached answer is negative; bypassing");
                }
                Some(answer) => return Some(CacheHit { scope, answer }),
                None => {}
            }
        }
        None
    }

    /// Store a generated answer in the user's scope and the global scope.
    /// Returns false when the answer is negative and was not stored.
    pub async fn remember(&self, user_id: Option<&str>, question: &str, answer: &str) -> Result<bool> {
        if self.policy.should_bypass(answer) {
            return Ok(false);
        }
        if let Some(user) = user_id {
            self.set_user_answer(user, question, answer).await?;
        }
        self.set_global_answer(question, answer).await?;
        Ok(true)
    }

    /// Drop one user's entries, or every user's when `user_id` is `None`.
    pub async fn clear_user(&self, user_id: Option<&str>) -> Result<usize> {
        let _guard = self.writes.lock().await;
        let before = self.entries.len();
        match user_id {
            Some(id) => {
                let scope = CacheScope::user(id);
                if let Some(table) = &self.table {
                    table.delete_scope(&scope).await.map_err(|e| Error::Storage(e.to_string()))?;
                }
                self.entries.retain(|(s, _), _| *s != scope);
            }
            None => {
                if let Some(table) = &self.table {
                    table.delete_users().await.map_err(|e| Error::Storage(e.to_string()))?;
                }
                self.entries.retain(|(s, _), _| *s == CacheScope::Global);
            }
        }
        Ok(before.saturating_sub(self.entries.len()))
    }

    pub async fn clear_global(&self) -> Result<usize> {
        let _guard = self.writes.lock().await;
        let before = self.entries.len();
        if let Some(table) = &self.table {
            if let Err(e) = table.delete_scope(&CacheScope::Global).await {
                warn!(error = %e, "failed to clear persisted global cache");
                return Err(Error::Storage(e.to_string()));
            }
        }
        self.entries.retain(|(s, _), _| *s != CacheScope::Global);
        Ok(before.saturating_sub(self.entries.len()))
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for e in &self.entries {
            match e.key().0 {
                CacheScope::Global => stats.global_entries += 1,
                CacheScope::User(_) => stats.user_entries += 1,
            }
        }
        stats
    }
}
