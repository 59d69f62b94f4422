//! Query understanding: heuristic and LLM rewriting, hypothetical-answer
//! expansion, focal tool selection, ambiguity detection and fact derivation.

pub mod clarify;
pub mod context;
pub mod facts;
pub mod focal;
pub mod heuristics;
pub mod hyde;
pub mod llm;
mod prompts;
pub mod rewrite;

pub use clarify::{AmbiguityKind, ClarificationNeeded, DisambiguationDetector};
pub use context::ConversationContext;
pub use facts::FactDeriver;
pub use focal::{FocalResult, FocalToolSelector};
pub use heuristics::HeuristicExpander;
pub use hyde::{ContextAnalysis, HydeExpander, HydeResult};
pub use llm::OpenAiChatGenerator;
pub use rewrite::{SemanticEnrichment, SemanticRewriter};
