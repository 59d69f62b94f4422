use chrono::{DateTime, Utc};
use std::fmt;

const USER_PREFIX: &str = "user:";
const GLOBAL: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    User(String),
    Global,
}

impl CacheScope {
    pub fn user(id: impl Into<String>) -> Self {
        CacheScope::User(id.into())
    }

    /// Parse the persisted form produced by `Display`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            GLOBAL => Some(CacheScope::Global),
            _ => raw.strip_prefix(USER_PREFIX).filter(|id| !id.is_empty()).map(CacheScope::user),
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheScope::User(id) => write!(f, "{USER_PREFIX}{id}"),
            CacheScope::Global => f.write_str(GLOBAL),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub scope: CacheScope,
    pub normalized: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// A usable cached answer and the scope it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub scope: CacheScope,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub user_entries: usize,
    pub global_entries: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.user_entries + self.global_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_parses_back() {
        for scope in [CacheScope::Global, CacheScope::user("alice")] {
            assert_eq!(CacheScope::parse(&scope.to_string()), Some(scope));
        }
        assert_eq!(CacheScope::parse("user:"), None);
        assert_eq!(CacheScope::parse("team:x"), None);
    }
}
