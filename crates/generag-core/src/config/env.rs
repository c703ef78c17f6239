use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("GENERAG_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("GENERAG_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("GENERAG_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("GENERAG_LLM_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_retries = n;
        }
        if let Ok(v) = std::env::var("GENERAG_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("GENERAG_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("GENERAG_INDEX_DIRECTORY") {
            self.index.directory = v.into();
        }
        if let Ok(v) = std::env::var("GENERAG_INDEX_NAME") {
            self.index.name = v;
        }
        if let Ok(v) = std::env::var("GENERAG_INGEST_POLICY") {
            match v.parse() {
                Ok(policy) => self.index.ingest_policy = policy,
                Err(e) => tracing::warn!("ignoring GENERAG_INGEST_POLICY: {e}"),
            }
        }
        if let Ok(v) = std::env::var("GENERAG_RETRIEVAL_TOP_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.top_k = k;
        }
        if let Ok(v) = std::env::var("GENERAG_CHUNK_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.splitter.chunk_size = size;
        }
        if let Ok(v) = std::env::var("GENERAG_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.splitter.chunk_overlap = overlap;
        }
    }
}
