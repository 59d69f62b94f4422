use councildb_cache::{AnswerCache, BypassPolicy, CacheScope};
use councildb_vector::table::open_db;
use tempfile::TempDir;

fn policy() -> BypassPolicy {
    BypassPolicy::new(["não encontrei", "não há base", "não tenho certeza", "não sei"])
}

#[tokio::test]
async fn round_trip_ignores_case_accents_and_punctuation() -> anyhow::Result<()> {
    let cache = AnswerCache::new(policy());
    cache.set_user_answer("alice", "Qual É A Pauta??", "Orçamento 2024.").await?;
    assert_eq!(cache.get_user_answer("alice", "qual e a pauta").as_deref(), Some("Orçamento 2024."));
    assert_eq!(cache.get_user_answer("bob", "qual e a pauta"), None);
    assert_eq!(cache.get_global_answer("qual e a pauta"), None);
    Ok(())
}

#[test]
fn negative_answers_are_bypassed() {
    let cache = AnswerCache::new(policy());
    assert!(cache.should_bypass("Não encontrei informações sobre isso."));
    assert!(cache.should_bypass("NAO SEI."));
    assert!(!cache.should_bypass("A reunião ocorreu em 2024."));
}

#[tokio::test]
async fn lookup_prefers_user_scope_and_skips_negatives() -> anyhow::Result<()> {
    let cache = AnswerCache::new(policy());
    cache.set_global_answer("Quando foi a reunião?", "Em 10/03/2024.").await?;
    assert_eq!(cache.lookup(Some("alice"), "quando foi a reuniao").map(|h| h.scope), Some(CacheScope::Global));

    cache.set_user_answer("alice", "Quando foi a reunião?", "Em 12/03/2024.").await?;
    let hit = cache.lookup(Some("alice"), "Quando foi a reunião?").expect("hit");
    assert_eq!(hit.scope, CacheScope::user("alice"));
    assert_eq!(hit.answer, "Em 12/03/2024.");

    cache.set_user_answer("alice", "Quando foi a reunião?", "Não encontrei essa informação.").await?;
    let hit = cache.lookup(Some("alice"), "Quando foi a reunião?").expect("falls through to global");
    assert_eq!(hit.scope, CacheScope::Global);

    cache.set_global_answer("Quando foi a reunião?", "Não tenho certeza.").await?;
    assert!(cache.lookup(Some("alice"), "Quando foi a reunião?").is_none());
    Ok(())
}

#[tokio::test]
async fn later_writes_overwrite_the_same_key() -> anyhow::Result<()> {
    let cache = AnswerCache::new(policy());
    cache.set_global_answer("Qual a pauta?", "primeira").await?;
    cache.set_global_answer("qual a PAUTA", "segunda").await?;
    assert_eq!(cache.get_global_answer("Qual a pauta?").as_deref(), Some("segunda"));
    assert_eq!(cache.stats().global_entries, 1);
    Ok(())
}

#[tokio::test]
async fn remember_skips_negative_answers() -> anyhow::Result<()> {
    let cache = AnswerCache::new(policy());
    assert!(!cache.remember(Some("bob"), "Quem presidiu?", "Não sei.").await?);
    assert_eq!(cache.stats().total(), 0);

    assert!(cache.remember(Some("bob"), "Quem presidiu?", "A reitora.").await?);
    let stats = cache.stats();
    assert_eq!((stats.user_entries, stats.global_entries), (1, 1));

    assert_eq!(cache.clear_user(Some("bob")).await?, 1);
    assert_eq!(cache.clear_global().await?, 1);
    assert_eq!(cache.stats().total(), 0);
    Ok(())
}

#[tokio::test]
async fn empty_questions_are_rejected() {
    let cache = AnswerCache::new(policy());
    assert!(cache.set_global_answer("?!", "x").await.is_err());
    assert!(cache.get_global_answer("   ").is_none());
}

#[tokio::test]
async fn persisted_entries_survive_reopen() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    {
        let cache = AnswerCache::open(open_db(&uri).await?, "answer_cache", policy()).await?;
        cache.set_user_answer("alice", "Qual a pauta?", "antiga").await?;
        cache.set_user_answer("alice", "Qual a pauta?", "nova").await?;
        cache.set_global_answer("Quem presidiu?", "A reitora.").await?;
        cache.set_user_answer("bob", "Quem presidiu?", "O vice.").await?;
        cache.clear_user(Some("bob")).await?;
    }
    let cache = AnswerCache::open(open_db(&uri).await?, "answer_cache", policy()).await?;
    assert_eq!(cache.get_user_answer("alice", "qual a pauta").as_deref(), Some("nova"));
    assert_eq!(cache.get_global_answer("Quem presidiu?").as_deref(), Some("A reitora."));
    assert_eq!(cache.get_user_answer("bob", "Quem presidiu?"), None);
    assert_eq!(cache.stats().total(), 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_writers_agree_in_memory_and_on_disk() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let uri = tmp.path().join("db").to_string_lossy().to_string();
    let cache = AnswerCache::open(open_db(&uri).await?, "answer_cache", policy()).await?;
    let answers: Vec<String> = (0..8).map(|i| format!("resposta {i}")).collect();
    let writes = answers.iter().map(|a| cache.set_global_answer("Qual a pauta?", a));
    for r in futures::future::join_all(writes).await {
        r?;
    }
    let in_memory = cache.get_global_answer("Qual a pauta?").expect("cached");
    assert!(answers.contains(&in_memory));

    let reopened = AnswerCache::open(open_db(&uri).await?, "answer_cache", policy()).await?;
    assert_eq!(reopened.get_global_answer("Qual a pauta?"), Some(in_memory));
    assert_eq!(reopened.stats().global_entries, 1);
    Ok(())
}
