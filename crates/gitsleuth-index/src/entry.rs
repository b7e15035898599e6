//! Naming and payload layout of stored chunks.

use std::collections::HashMap;

use serde_json::{Value, json};

use crate::chunker::Chunk;
use crate::languages::Lang;
use crate::scanner::ChunkKind;

/// Vector-store collection holding one session's chunks.
#[must_use]
pub fn collection_name(session_id: &str) -> String {
    format!("repo_{session_id}")
}

/// Globally unique id of a stored chunk.
#[must_use]
pub fn entry_id(session_id: &str, file_path: &str, chunk_id: usize) -> String {
    format!("{session_id}_{file_path}_{chunk_id}")
}

/// Extension with leading dot, or empty.
pub(crate) fn file_type(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn file_name(file_path: &str) -> &str {
    file_path.rsplit('/').next().unwrap_or(file_path)
}

/// Metadata stored alongside a chunk's vector.
#[must_use]
pub fn chunk_payload(session_id: &str, chunk: &Chunk) -> HashMap<String, Value> {
    HashMap::from([
        ("session_id".to_owned(), json!(session_id)),
        ("file_path".to_owned(), json!(chunk.file_path)),
        ("file_name".to_owned(), json!(file_name(&chunk.file_path))),
        ("file_type".to_owned(), json!(file_type(&chunk.file_path))),
        ("chunk_id".to_owned(), json!(chunk.chunk_id)),
        ("start_line".to_owned(), json!(chunk.start_line)),
        ("end_line".to_owned(), json!(chunk.end_line)),
        ("chunk_type".to_owned(), json!(chunk.kind)),
        ("language".to_owned(), json!(chunk.language)),
        ("is_semantic".to_owned(), json!(chunk.is_semantic)),
        ("content".to_owned(), json!(chunk.content)),
    ])
}

/// Rebuild a chunk from a stored payload. Missing numeric fields read as zero;
/// a missing path or content yields `None`.
#[must_use]
pub fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<Chunk> {
    let text = |key: &str| payload.get(key).and_then(Value::as_str);
    let number = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    };
    let content = text("content")?.to_owned();
    let file_path = text("file_path")?.to_owned();
    let kind = payload
        .get("chunk_type")
        .and_then(|v| serde_json::from_value::<ChunkKind>(v.clone()).ok())
        .unwrap_or(ChunkKind::TextSection);
    let language = payload
        .get("language")
        .and_then(|v| serde_json::from_value::<Lang>(v.clone()).ok())
        .unwrap_or(Lang::Text);

    Some(Chunk {
        chunk_size: content.chars().count(),
        content,
        file_path,
        start_line: number("start_line"),
        end_line: number("end_line"),
        kind,
        language,
        is_semantic: payload
            .get("is_semantic")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        chunk_id: number("chunk_id"),
    })
}
