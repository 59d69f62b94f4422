//! Numeric and structural facts pulled from retrieved chunk text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use councildb_core::text::contains_any;
use councildb_core::types::SearchResult;

static VOTE_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(\d+)\s+votos?\s+(?:a\s+)?favor.*?(\d+)\s+contra.*?(\d+)\s+absten").expect("valid regex")
});
static UNANIMOUS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)aprovad[oa]\s+por\s+unanimidade").expect("valid regex"));
static MAJORITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)aprovad[oa]\s+por\s+maioria").expect("valid regex"));
static PRESENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)presentes:\s*([^\n]+)").expect("valid regex"));
static PARTICIPANT_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+)\s+participantes?").expect("valid regex"));
static QUORUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)qu[oó]rum\s+de\s+(\d+)").expect("valid regex"));
static QUORUM_MET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)qu[oó]rum\s+atingido").expect("valid regex"));
static QUORUM_MISSED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:sem\s+qu[oó]rum|qu[oó]rum\s+n[aã]o\s+atingido)").expect("valid regex"));

const VOTING_TERMS: [&str; 5] = ["votacao", "votação", "voto", "aprovad", "resultado"];
const PARTICIPANT_TERMS: [&str; 5] = ["participantes", "presenca", "presença", "quem", "quantos"];
const QUORUM_TERMS: [&str; 2] = ["quorum", "quórum"];

/// Shorter fragments after "presentes:" are separators or noise.
const MIN_NAME_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct FactDeriver;

impl FactDeriver {
    /// Facts for every intent the question carries, in first-seen order
    /// without repeats. Never fails; no match means no facts.
    pub fn derive(&self, question: &str, chunks: &[SearchResult]) -> Vec<String> {
        let q = question.to_lowercase();
        let mut facts = Vec::new();
        if contains_any(&q, &VOTING_TERMS) {
            facts.extend(voting_facts(chunks));
        }
        if contains_any(&q, &PARTICIPANT_TERMS) {
            facts.extend(participant_facts(chunks));
        }
        if contains_any(&q, &QUORUM_TERMS) {
            facts.extend(quorum_facts(chunks));
        }
        let mut seen = BTreeSet::new();
        facts.retain(|f| seen.insert(f.clone()));
        facts
    }
}

fn voting_facts(chunks: &[SearchResult]) -> Vec<String> {
    let mut facts = Vec::new();
    for c in chunks {
        if let Some(m) = VOTE_COUNT_RE.captures(&c.text) {
            let counts: Vec<u64> = (1..=3).filter_map(|i| m[i].parse().ok()).collect();
            if let &[favor, against, abstain] = counts.as_slice() {
                facts.push(format!(
                    "Votação: {favor} a favor, {against} contra, {abstain} abstenções (total: {})",
                    favor + against + abstain
                ));
            }
        }
        if UNANIMOUS_RE.is_match(&c.text) {
            facts.push("Aprovado por unanimidade".to_string());
        }
        if MAJORITY_RE.is_match(&c.text) {
            facts.push("Aprovado por maioria".to_string());
        }
    }
    facts
}

fn participant_facts(chunks: &[SearchResult]) -> Vec<String> {
    let mut facts = Vec::new();
    let mut names = BTreeSet::new();
    for c in chunks {
        if let Some(m) = PRESENT_RE.captures(&c.text) {
            names.extend(
                m[1].split([',', ';'])
                    .map(str::trim)
                    .filter(|n| n.chars().count() >= MIN_NAME_CHARS)
                    .map(str::to_string),
            );
        }
        if let Some(m) = PARTICIPANT_COUNT_RE.captures(&c.text) {
            facts.push(format!("Total de participantes: {}", &m[1]));
        }
    }
    if !names.is_empty() {
        facts.push(format!("Participantes identificados: {}", names.len()));
    }
    facts
}

fn quorum_facts(chunks: &[SearchResult]) -> Vec<String> {
    let mut facts = Vec::new();
    for c in chunks {
        if let Some(m) = QUORUM_RE.captures(&c.text) {
            facts.push(format!("Quórum: {}", &m[1]));
        }
        if QUORUM_MISSED_RE.is_match(&c.text) {
            facts.push("Sem quórum".to_string());
        } else if QUORUM_MET_RE.is_match(&c.text) {
            facts.push("Quórum atingido".to_string());
        }
    }
    facts
}
