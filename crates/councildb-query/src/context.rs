use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use councildb_core::types::Message;

static RESOLUTION_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{2,3}/\d{4}\b|\b\d{2,3}\b").expect("valid regex"));
static MINUTES_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,2}\b").expect("valid regex"));

/// What recent conversation turns mention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    pub documents: BTreeSet<String>,
    pub numbers: BTreeSet<String>,
    pub councils: BTreeSet<String>,
    pub topics: BTreeSet<String>,
}

impl ConversationContext {
    /// Scan the last `max_messages` messages of `history`.
    pub fn extract(history: &[Message], max_messages: usize) -> Self {
        let mut ctx = Self::default();
        let start = history.len().saturating_sub(max_messages);
        for msg in &history[start..] {
            let content = msg.content.to_lowercase();
            if content.contains("resolução") || content.contains("resolucao") {
                ctx.numbers.extend(RESOLUTION_NUMBER_RE.find_iter(&content).map(|m| m.as_str().to_string()));
                ctx.documents.insert("resolucao".into());
            }
            if content.contains("ata") {
                ctx.numbers.extend(MINUTES_NUMBER_RE.find_iter(&content).map(|m| m.as_str().to_string()));
                ctx.documents.insert("ata".into());
            }
            if content.contains("consuni") {
                ctx.councils.insert("CONSUNI".into());
            }
            if content.contains("cepe") {
                ctx.councils.insert("CEPE".into());
            }
            if content.contains("votação") || content.contains("votacao") {
                ctx.topics.insert("votacao".into());
            }
            if content.contains("aprovação") || content.contains("aprovacao") {
                ctx.topics.insert("aprovacao".into());
            }
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.numbers.is_empty() && self.councils.is_empty() && self.topics.is_empty()
    }

    /// Prompt-ready summary of the mentions.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        for (label, set) in [
            ("Documentos mencionados", &self.documents),
            ("Números mencionados", &self.numbers),
            ("Conselhos mencionados", &self.councils),
            ("Tópicos mencionados", &self.topics),
        ] {
            if !set.is_empty() {
                parts.push(format!("{label}: {}", set.iter().cloned().collect::<Vec<_>>().join(", ")));
            }
        }
        if parts.is_empty() {
            "Nenhum contexto específico detectado.".to_string()
        } else {
            parts.join("\n")
        }
    }
}
