//! Answer cache: per-user and global question → answer memory keyed by the
//! normalized question, with a negative-answer bypass policy.

pub mod cache;
pub mod entry;
pub mod persist;
pub mod policy;

pub use cache::AnswerCache;
pub use entry::{CacheEntry, CacheHit, CacheScope, CacheStats};
pub use policy::BypassPolicy;
