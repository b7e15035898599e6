//! Test-only mock LLM provider.
//!
//! Embeddings are a deterministic hashed bag of words, so texts sharing
//! identifiers land close together and retrieval tests get stable rankings.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

pub const MOCK_DIMENSIONS: usize = 64;

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    last_messages: Arc<Mutex<Vec<Message>>>,
    embed_calls: Arc<AtomicUsize>,
    pub default_response: String,
    pub dimensions: usize,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Fail any embedding request whose input contains this substring.
    pub fail_embed_containing: Option<String>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            last_messages: Arc::new(Mutex::new(Vec::new())),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            dimensions: MOCK_DIMENSIONS,
            fail_chat: false,
            fail_embed: false,
            fail_embed_containing: None,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_embed_failure(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_embed_failure_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_embed_containing = Some(needle.into());
        self
    }

    /// Messages passed to the most recent `chat` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages.lock().unwrap().clone()
    }

    /// Number of `embed`/`embed_batch` requests served so far.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::Relaxed)
    }

    fn check_embed(&self, text: &str) -> Result<(), LlmError> {
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        if let Some(needle) = &self.fail_embed_containing
            && text.contains(needle.as_str())
        {
            return Err(LlmError::Other(format!("mock embedding rejected '{needle}'")));
        }
        Ok(())
    }
}

/// Hashed bag-of-words vector, L2-normalized.
#[must_use]
pub fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let dimensions = dimensions.max(1);
    let mut vector = vec![0.0_f32; dimensions];
    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
    {
        let bucket = fnv1a(&token.to_lowercase()) % dimensions as u64;
        #[allow(clippy::cast_possible_truncation)]
        {
            vector[bucket as usize] += 1.0;
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        vector[0] = 1.0;
    } else {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        *self.last_messages.lock().unwrap() = messages.to_vec();
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::Relaxed);
        self.check_embed(text)?;
        Ok(hashed_embedding(text, self.dimensions))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.embed_calls.fetch_add(1, Ordering::Relaxed);
        for text in texts {
            self.check_embed(text)?;
        }
        Ok(texts
            .iter()
            .map(|t| hashed_embedding(t, self.dimensions))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn scripted_responses_then_default() {
        let p = MockProvider::with_responses(vec!["first".into()]);
        assert_eq!(p.chat(&[Message::user("a")]).await.unwrap(), "first");
        assert_eq!(p.chat(&[Message::user("b")]).await.unwrap(), "mock response");
        assert_eq!(p.last_messages()[0].content, "b");
    }

    #[tokio::test]
    async fn failing_chat() {
        assert!(MockProvider::failing().chat(&[]).await.is_err());
    }

    #[tokio::test]
    async fn embed_failure_builder() {
        let p = MockProvider::default().with_embed_failure();
        assert!(p.embed("anything").await.is_err());
        assert!(p.embed_batch(&["x".into()]).await.is_err());
        assert!(p.chat(&[Message::user("still fine")]).await.is_ok());
    }

    #[tokio::test]
    async fn embed_failure_on_substring() {
        let p = MockProvider::default().with_embed_failure_on("poison");
        assert!(p.embed("fine text").await.is_ok());
        let err = p
            .embed_batch(&["ok".into(), "poison pill".into()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("poison"));
        assert_eq!(p.embed_calls(), 2);
    }

    #[test]
    fn embedding_is_normalized_and_deterministic() {
        let a = hashed_embedding("fn parse_config(path)", 64);
        let b = hashed_embedding("fn parse_config(path)", 64);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_are_closer() {
        let query = hashed_embedding("parse config", 64);
        let near = hashed_embedding("fn parse_config reads the config file and calls parse", 64);
        let far = hashed_embedding("render widget frame buffer", 64);
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn empty_text_has_unit_vector() {
        let v = hashed_embedding("", 8);
        assert_eq!(v[0], 1.0);
        assert!(v[1..].iter().all(|x| *x == 0.0));
    }
}
