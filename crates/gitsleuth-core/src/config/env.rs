use super::{Config, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("GITSLEUTH_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid GITSLEUTH_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("GITSLEUTH_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("GITSLEUTH_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("GITSLEUTH_VECTOR_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.vector_store.backend = backend;
            } else {
                tracing::warn!("ignoring invalid GITSLEUTH_VECTOR_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_QDRANT_URL") {
            self.vector_store.qdrant_url = v;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("GITSLEUTH_INDEX_WORKERS") {
            match v.parse::<usize>() {
                Ok(n) => self.index.workers = n,
                Err(_) => tracing::warn!("ignoring invalid GITSLEUTH_INDEX_WORKERS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_INDEX_BATCH_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.index.batch_size = n,
                Err(_) => tracing::warn!("ignoring invalid GITSLEUTH_INDEX_BATCH_SIZE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_INDEX_EMBED_CONCURRENCY") {
            match v.parse::<usize>() {
                Ok(n) => self.index.embed_concurrency = n,
                Err(_) => {
                    tracing::warn!("ignoring invalid GITSLEUTH_INDEX_EMBED_CONCURRENCY value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_RETRIEVAL_TOP_K") {
            match v.parse::<usize>() {
                Ok(n) => self.retrieval.top_k = n,
                Err(_) => tracing::warn!("ignoring invalid GITSLEUTH_RETRIEVAL_TOP_K value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_RETRIEVAL_MAX_DISTANCE") {
            match v.parse::<f32>() {
                Ok(d) if d.is_finite() => self.retrieval.max_distance = Some(d),
                _ => tracing::warn!("ignoring invalid GITSLEUTH_RETRIEVAL_MAX_DISTANCE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("GITSLEUTH_CONVERSATION_MAX_MESSAGES") {
            match v.parse::<usize>() {
                Ok(n) => self.conversation.max_messages = n,
                Err(_) => {
                    tracing::warn!("ignoring invalid GITSLEUTH_CONVERSATION_MAX_MESSAGES value: {v}");
                }
            }
        }
    }

    fn apply_env_secrets(&mut self) {
        let key = std::env::var("GITSLEUTH_OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = key {
            self.secrets.openai_api_key = Some(Secret::new(key));
        }
    }
}
