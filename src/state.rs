use std::str::FromStr;
use std::time::Duration;

/// Model selection per call site. Each component picks its model from here
/// instead of reading a process-wide setting.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Relevance verdicts.
    pub classification: String,
    /// Quote extraction and per-document insight.
    pub inference: String,
    /// Section synthesis and citation integration.
    pub writer: String,
}

impl ModelConfig {
    /// Use one model for every call site.
    pub fn uniform(model: &str) -> Self {
        Self {
            classification: model.to_string(),
            inference: model.to_string(),
            writer: model.to_string(),
        }
    }

    pub fn from_env() -> Self {
        let default =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "deepseek-r1:8b".to_string());
        Self {
            classification: dotenv::var("LLM_CLASSIFICATION_MODEL")
                .unwrap_or_else(|_| default.clone()),
            inference: dotenv::var("LLM_INFERENCE_MODEL").unwrap_or_else(|_| default.clone()),
            writer: dotenv::var("LLM_WRITER_MODEL").unwrap_or(default),
        }
    }
}

/// Tunable pipeline parameters, passed explicitly to every component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub models: ModelConfig,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// A verdict must be relevant AND strictly above this confidence.
    pub relevance_threshold: f64,
    pub relevance_prefix_chars: usize,
    pub quote_prefix_chars: usize,
    pub insight_prefix_chars: usize,
    pub quote_max_attempts: u32,
    pub quote_retry_backoff: Duration,
    pub fetch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            models: ModelConfig::uniform("deepseek-r1:8b"),
            chunk_size: 2500,
            chunk_overlap: 150,
            relevance_threshold: 0.7,
            relevance_prefix_chars: 4000,
            quote_prefix_chars: 4000,
            insight_prefix_chars: 2000,
            quote_max_attempts: 5,
            quote_retry_backoff: Duration::from_millis(2000),
            fetch_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by whatever is set in the environment / `.env`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            models: ModelConfig::from_env(),
            chunk_size: env_or("CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: env_or("CHUNK_OVERLAP", defaults.chunk_overlap),
            relevance_threshold: env_or("RELEVANCE_THRESHOLD", defaults.relevance_threshold),
            relevance_prefix_chars: defaults.relevance_prefix_chars,
            quote_prefix_chars: defaults.quote_prefix_chars,
            insight_prefix_chars: defaults.insight_prefix_chars,
            quote_max_attempts: env_or("QUOTE_MAX_ATTEMPTS", defaults.quote_max_attempts).max(1),
            quote_retry_backoff: Duration::from_millis(env_or(
                "QUOTE_RETRY_BACKOFF_MS",
                defaults.quote_retry_backoff.as_millis() as u64,
            )),
            fetch_concurrency: env_or("FETCH_CONCURRENCY", defaults.fetch_concurrency).max(1),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
