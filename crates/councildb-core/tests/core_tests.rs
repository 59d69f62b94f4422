use std::fs;
use tempfile::TempDir;

use councildb_core::config::{Config, EmbeddingProviderKind};
use councildb_core::data_processor::{extract_metadata, ChunkingConfig, DataProcessor};
use councildb_core::text::normalize_question;
use councildb_core::types::{DocumentType, Owner};
use figment::providers::{Format, Toml};
use figment::Figment;
use proptest::prelude::*;

const MINUTES: &str = "# Ata da 12ª Sessão Ordinária do CONSUNI\n\
Número: 12/2024\n\
Data: 15/03/2024\n\
\n\
Presentes: Maria Souza, João Lima, Ana Reis\n\
\n\
## Deliberações\n\
A proposta foi aprovada por unanimidade.\n";

#[test]
fn process_directory_infers_type_from_folder() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("atas")).unwrap();
    fs::create_dir_all(dir.join("misc")).unwrap();
    fs::write(dir.join("atas").join("sessao-12.md"), MINUTES).unwrap();
    fs::write(dir.join("misc").join("nota.txt"), "Nota solta sem cabeçalho").unwrap();
    fs::write(dir.join("misc").join("image.png"), [0u8, 1, 2]).unwrap();

    let docs = DataProcessor::new().process_directory(dir).expect("process");

    assert_eq!(docs.len(), 2, "binary files are ignored");
    let minutes = docs.iter().find(|d| d.document.doc_type == DocumentType::Minutes).expect("minutes doc");
    assert_eq!(minutes.document.title, "Ata da 12ª Sessão Ordinária do CONSUNI");
    assert_eq!(minutes.document.number.as_deref(), Some("12/2024"));
    assert_eq!(minutes.document.date.as_deref(), Some("15/03/2024"));
    assert_eq!(minutes.document.council.as_deref(), Some("CONSUNI"));

    let other = docs.iter().find(|d| d.document.doc_type == DocumentType::Other).expect("other doc");
    assert_eq!(other.document.title, "nota", "file stem is the fallback title");
}

#[test]
fn headings_start_new_chunks_with_section_metadata() {
    let processed = DataProcessor::new().process_text(MINUTES, "atas/x.md", DocumentType::Minutes, "x");
    assert_eq!(processed.chunks.len(), 2);
    let last = &processed.chunks[1];
    assert_eq!(last.position, 1);
    assert!(last.text.starts_with("## Deliberações"));
    assert_eq!(last.metadata.get("section").map(String::as_str), Some("Deliberações"));
    assert_eq!(last.metadata.get("doc_type").map(String::as_str), Some("minutes"));
}

#[test]
fn long_sections_split_with_line_overlap() {
    let body: String = (0..20).map(|i| format!("linha número {i:02} com algum texto de preenchimento\n")).collect();
    let processor = DataProcessor::new().with_chunking(ChunkingConfig { max_chars: 200, overlap_lines: 2 });
    let processed = processor.process_text(&body, "x.txt", DocumentType::Other, "x");

    assert!(processed.chunks.len() > 1);
    let first_lines: Vec<&str> = processed.chunks[0].text.lines().collect();
    let second_lines: Vec<&str> = processed.chunks[1].text.lines().collect();
    assert_eq!(&first_lines[first_lines.len() - 2..], &second_lines[..2], "last two lines carried over");
}

#[test]
fn identical_content_hashes_identically() {
    let p = DataProcessor::new().with_owner(Owner::User("u1".into()));
    let a = p.process_text(MINUTES, "a.md", DocumentType::Minutes, "a");
    let b = p.process_text(MINUTES, "b.md", DocumentType::Minutes, "b");
    assert_eq!(a.document.content_hash, b.document.content_hash);
    assert_eq!(a.document.owner, Owner::User("u1".into()));
}

#[test]
fn metadata_reads_cepe_and_ordinal_number() {
    let meta = extract_metadata("RESOLUÇÃO CEPE Nº 45/2023\nem 01/02/2023\n");
    assert_eq!(meta.council.as_deref(), Some("CEPE"));
    assert_eq!(meta.number.as_deref(), Some("45/2023"));
    assert_eq!(meta.date.as_deref(), Some("01/02/2023"));
    assert_eq!(meta.title, None);
}

#[test]
fn settings_defaults_and_overrides() {
    let config = Config::from_figment(Figment::from(Toml::string(
        r#"
        [retrieval]
        top_k = 7

        [embedding]
        provider = "fake"
        dimension = 64
        "#,
    )));
    let settings = config.settings().expect("settings");
    assert_eq!(settings.retrieval.top_k, 7);
    assert_eq!(settings.retrieval.min_filtered_results, 3);
    assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Fake);
    assert_eq!(settings.embedding.dimension, 64);
    assert_eq!(settings.tables.tools[0].name, "agenda");
    assert!(!settings.cache.negative_phrases.is_empty());
}

#[test]
fn zero_top_k_is_rejected() {
    let config = Config::from_figment(Figment::from(Toml::string("[retrieval]\ntop_k = 0\n")));
    assert!(config.settings().is_err());
}

#[test]
fn normalization_examples() {
    assert_eq!(normalize_question("Qual a PAUTA?"), normalize_question("qual a pauta"));
    assert_eq!(normalize_question("Reunião, sessão; votação!"), "reuniao sessao votacao");
    assert_eq!(normalize_question("   "), "");
}

proptest! {
    #[test]
    fn normalization_is_idempotent(s in "[a-zA-ZÀ-ÿ0-9 ?!.,;:]{0,40}") {
        let once = normalize_question(&s);
        prop_assert_eq!(normalize_question(&once), once);
    }
}
