//! Configuration loader, typed settings and path helpers.
//!
//! Figment merges built-in defaults, `config.toml`, `config.<env>.toml` and
//! `APP_*` env vars (nested keys split on `__`, e.g. `APP_RETRIEVAL__TOP_K`).
//! The keyword, tool and disambiguation tables live here as data so they can
//! be replaced from configuration without touching code.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::DocumentType;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Built-in defaults layered under an arbitrary figment (used by tests and embedders).
    pub fn from_figment(extra: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(extra) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
    pub tables: QueryTables,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.clarification_threshold) {
            return Err(Error::InvalidConfig("retrieval.clarification_threshold must be within [0, 1]".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        if self.tables.tools.iter().any(|t| t.detect_terms.is_empty()) {
            return Err(Error::InvalidConfig("every tool needs at least one detect term".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub db_dir: String,
    pub docs_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { db_dir: "./data/lancedb".into(), docs_dir: "./data/documents".into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Fake,
    Local,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimension: usize,
    pub max_len: usize,
    /// Directory holding `tokenizer.json`, `config.json` and weights for the local model.
    pub model_dir: Option<String>,
    pub api_url: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: "sentence-transformers/all-MiniLM-L6-v2".into(),
            dimension: 384,
            max_len: 256,
            model_dir: None,
            api_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "openai/gpt-3.5-turbo".into(),
            api_key_env: "OPENROUTER_API_KEY".into(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// A type-filtered search returning fewer hits than this is retried unfiltered.
    pub min_filtered_results: usize,
    /// Clarifications are acted on only when their confidence is strictly above this.
    pub clarification_threshold: f32,
    pub disambiguation_window: usize,
    pub temporal_window: usize,
    pub use_llm_rewrite: bool,
    pub use_hyde: bool,
    pub history_messages: usize,
    pub hyde_cache_capacity: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_filtered_results: 3,
            clarification_threshold: 0.7,
            disambiguation_window: 8,
            temporal_window: 5,
            use_llm_rewrite: true,
            use_hyde: false,
            history_messages: 10,
            hyde_cache_capacity: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Answers containing any of these (after normalization) are never served from cache.
    pub negative_phrases: Vec<String>,
    pub persist: bool,
    pub table: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            negative_phrases: strings(&[
                "não encontrei",
                "não há base",
                "sem base documental",
                "não tenho certeza",
                "não há evidência",
                "não sei",
                "sem informação",
            ]),
            persist: true,
            table: "answer_cache".into(),
        }
    }
}

/// Keyword → expansion terms for the heuristic expander.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordExpansion {
    pub keyword: String,
    pub expansions: Vec<String>,
}

/// A focal retrieval tool. Tools are matched in table order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub detect_terms: Vec<String>,
    pub filter_terms: Vec<String>,
    #[serde(default)]
    pub doc_type: Option<DocumentType>,
    #[serde(default)]
    pub boost: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisambiguationTerms {
    pub temporal: Vec<String>,
    pub vague: Vec<String>,
    pub specific: Vec<String>,
}

impl Default for DisambiguationTerms {
    fn default() -> Self {
        Self {
            temporal: strings(&["pauta", "ata", "reunião", "reuniao"]),
            vague: strings(&["qual", "quando", "onde"]),
            specific: strings(&["última", "ultima", "próxima", "proxima", "número", "numero"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTables {
    pub keywords: Vec<KeywordExpansion>,
    pub tools: Vec<ToolConfig>,
    pub disambiguation: DisambiguationTerms,
}

impl Default for QueryTables {
    fn default() -> Self {
        Self { keywords: default_keywords(), tools: default_tools(), disambiguation: DisambiguationTerms::default() }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn keyword(keyword: &str, expansions: &[&str]) -> KeywordExpansion {
    KeywordExpansion { keyword: keyword.into(), expansions: strings(expansions) }
}

fn default_keywords() -> Vec<KeywordExpansion> {
    let voting = ["votação", "resultado", "quórum", "aprovada", "unanimidade", "voto"];
    let resolution = ["resolução", "número", "vigência", "ementa", "deliberação"];
    let summons = ["convocação", "data da reunião", "envio"];
    vec![
        keyword("pauta", &["pauta", "agenda", "ordem do dia", "calendário"]),
        keyword("ata", &["ata", "sessão", "reunião", "registros", "assinaturas"]),
        keyword("votação", &voting),
        keyword("votacao", &voting),
        keyword("resolução", &resolution),
        keyword("resolucao", &resolution),
        keyword("portaria", &["portaria", "turmas", "número da portaria"]),
        keyword("regimento", &["regimento", "estatuto", "normas", "regulamento"]),
        keyword("conselho", &["CONSUN", "CONSUNI", "CEPE", "Conselho Universitário"]),
        keyword("presidente", &["presidente da sessão", "quem presidiu", "reitor"]),
        keyword("convocação", &summons),
        keyword("convocacao", &summons),
    ]
}

fn tool(name: &str, detect: &[&str], filter: &[&str], doc_type: Option<DocumentType>, boost: &str) -> ToolConfig {
    ToolConfig {
        name: name.into(),
        detect_terms: strings(detect),
        filter_terms: strings(filter),
        doc_type,
        boost: boost.into(),
    }
}

// Meeting-date sits ahead of minutes: "reunião" alone must not shadow a date question.
fn default_tools() -> Vec<ToolConfig> {
    vec![
        tool(
            "agenda",
            &["pauta", "agenda", "ordem do dia"],
            &["pauta", "agenda", "convocação", "convocacao"],
            Some(DocumentType::Agenda),
            "",
        ),
        tool(
            "meeting-date",
            &["quando foi", "data da reuniao", "data da reunião", "que dia", "quando ocorreu", "quando será", "quando sera"],
            &["ata", "agenda", "pauta", "convocação", "convocacao"],
            None,
            " data reunião sessão ata agenda pauta convocação",
        ),
        tool(
            "voting",
            &["votacao", "votação", "resultado", "quorum", "quórum", "voto", "aprovad"],
            &["votação", "votacao", "ata"],
            None,
            " votação resultado quórum aprovada",
        ),
        tool(
            "participants",
            &["participantes", "presenca", "presença", "assinaturas", "quem participou"],
            &["participantes", "assinaturas", "presentes", "ata"],
            None,
            " participantes presença assinaturas lista",
        ),
        tool("minutes", &["ata", "sessao", "sessão", "reuniao", "reunião"], &["ata"], Some(DocumentType::Minutes), ""),
        tool("resolution", &["resolucao", "resolução"], &["resolução", "resolucao"], Some(DocumentType::Resolution), ""),
        tool("bylaw", &["regimento", "estatuto"], &["regimento", "estatuto"], Some(DocumentType::Bylaw), ""),
        tool("ordinance", &["portaria"], &["portaria"], None, ""),
    ]
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
