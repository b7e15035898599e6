use std::sync::Arc;

use gitsleuth_index::{
    Indexer, IndexerConfig, QueryConfig, QueryEngine, RetrievalConfig, chunk_document,
    ChunkerConfig,
};
use gitsleuth_llm::mock::MockProvider;
use gitsleuth_memory::{ConversationStore, InMemoryVectorStore, VectorStore};

const TOKENIZER_PY: &str = r#"def tokenize(text):
    """Split text into lowercase word tokens."""
    return [word.lower() for word in text.split() if word]
"#;

const STORAGE_RS: &str = r#"pub fn persist_records(path: &std::path::Path, rows: &[String]) -> std::io::Result<()> {
    std::fs::write(path, rows.join("\n"))
}
"#;

const NOTES: &str = "Release checklist\n\nBump the version, tag the commit and publish the changelog.\n";

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tokenizer.py"), TOKENIZER_PY).unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/storage.rs"), STORAGE_RS).unwrap();
    std::fs::write(dir.path().join("NOTES.txt"), NOTES).unwrap();
    dir
}

#[test]
fn fixture_chunks_split_into_semantic_and_fallback() {
    let config = ChunkerConfig::default();
    let py = chunk_document(TOKENIZER_PY, "tokenizer.py", ".py", &config);
    let rs = chunk_document(STORAGE_RS, "src/storage.rs", ".rs", &config);
    let notes = chunk_document(NOTES, "NOTES.txt", ".txt", &config);

    let semantic = py.iter().chain(&rs).filter(|c| c.is_semantic).count();
    assert!(semantic >= 2);
    assert!(!notes.is_empty());
    assert!(notes.iter().all(|c| !c.is_semantic));
}

#[tokio::test]
async fn index_then_ask_about_a_named_file() {
    let dir = fixture();
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let provider = Arc::new(MockProvider::with_responses(vec![
        "tokenize splits text into lowercase words.".into(),
        "It writes rows to disk.".into(),
    ]));

    let report = Indexer::new(Arc::clone(&store), Arc::clone(&provider), IndexerConfig::default())
        .create_index(dir.path(), "e2e")
        .await
        .unwrap();
    assert_eq!(report.files_discovered, 3);
    assert_eq!(report.chunks_indexed, 3);
    assert!(!report.is_partial());

    let engine = QueryEngine::new(
        store,
        provider,
        Arc::new(ConversationStore::default()),
        RetrievalConfig::default(),
        QueryConfig::default(),
    );

    let first = engine
        .query("What does tokenizer.py do?", "e2e", None)
        .await
        .unwrap();
    assert_eq!(first.sources[0].file, "tokenizer.py");
    assert_eq!(first.sources.len(), 3);

    let second = engine
        .query(
            "and what does storage do?",
            "e2e",
            Some(&first.conversation_id),
        )
        .await
        .unwrap();
    assert_eq!(second.sources[0].file, "src/storage.rs");
    assert_eq!(second.conversation_id, first.conversation_id);

    let stats = engine.conversations().stats(&first.conversation_id).unwrap();
    assert_eq!(stats.total_messages, 4);

    let json = serde_json::to_value(&second).unwrap();
    assert!(json["answer"].as_str().unwrap().starts_with("It writes rows"));
    assert!(json["confidence"].is_string());
    assert!(json["sources"][0]["line_number"].is_number());
}
