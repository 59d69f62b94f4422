use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use councildb_core::config::{KeywordExpansion, QueryTables};

static FULL_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("valid regex"));
static MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{2}/\d{4}\b").expect("valid regex"));
static DOC_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3,4}\b").expect("valid regex"));

/// Keyword, date and document-number terms for query augmentation.
#[derive(Debug, Clone)]
pub struct HeuristicExpander {
    keywords: Vec<KeywordExpansion>,
}

impl Default for HeuristicExpander {
    fn default() -> Self {
        Self::from_tables(&QueryTables::default())
    }
}

impl HeuristicExpander {
    pub fn new(keywords: Vec<KeywordExpansion>) -> Self {
        Self { keywords }
    }

    pub fn from_tables(tables: &QueryTables) -> Self {
        Self::new(tables.keywords.clone())
    }

    /// Deduplicated, sorted terms. Keywords match as substrings of the
    /// lowercased question.
    pub fn extract(&self, question: &str) -> Vec<String> {
        let q = question.to_lowercase();
        let mut terms: BTreeSet<String> = BTreeSet::new();
        for k in &self.keywords {
            if q.contains(&k.keyword.to_lowercase()) {
                terms.extend(k.expansions.iter().cloned());
            }
        }
        for re in [&*FULL_DATE_RE, &*MONTH_YEAR_RE, &*DOC_NUMBER_RE] {
            terms.extend(re.find_iter(&q).map(|m| m.as_str().to_string()));
        }
        terms.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agenda_keyword_expands() {
        let terms = HeuristicExpander::default().extract("Qual a PAUTA de amanhã?");
        assert_eq!(terms, vec!["agenda", "calendário", "ordem do dia", "pauta"]);
    }

    #[test]
    fn dates_and_numbers_are_collected() {
        let terms = HeuristicExpander::new(vec![]).extract("Reunião de 15/03/2024 sobre a portaria 123");
        assert_eq!(terms, vec!["03/2024", "123", "15/03/2024", "2024"]);
    }

    #[test]
    fn nothing_to_extract() {
        assert!(HeuristicExpander::default().extract("Bom dia").is_empty());
    }
}
