use councildb_core::text::normalize_question;

/// Answers matching one of these phrases are never served from cache.
#[derive(Debug, Clone, Default)]
pub struct BypassPolicy {
    phrases: Vec<String>,
}

impl BypassPolicy {
    /// Phrases are compared after normalization, so accent and case variants
    /// need not be listed separately.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phrases: Vec<String> =
            phrases.into_iter().map(|p| normalize_question(p.as_ref())).filter(|p| !p.is_empty()).collect();
        phrases.sort();
        phrases.dedup();
        Self { phrases }
    }

    pub fn should_bypass(&self, answer: &str) -> bool {
        let normalized = normalize_question(answer);
        self.phrases.iter().any(|p| normalized.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::BypassPolicy;

    #[test]
    fn empty_phrases_are_dropped() {
        let policy = BypassPolicy::new(["", "  ", "não sei"]);
        assert!(!policy.should_bypass("Tudo certo."));
        assert!(policy.should_bypass("Eu NAO SEI responder."));
    }
}
