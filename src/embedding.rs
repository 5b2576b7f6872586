//! Embedding provider implementations.
//!
//! - **`disabled`**: returns errors; used when semantic search is turned off.
//! - **`hash`**: the offline [`HashEmbedder`] from the core crate.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Use [`create_provider`] to validate the configuration and build the
//! matching provider, then [`embed_texts`] / [`embed_query`] to embed.
//!
//! # Retry Strategy
//!
//! The network providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

pub use cli_unites_core::embedding::{EmbeddingProvider, HashEmbedder};

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Embed a batch of texts using the configured provider.
///
/// Returns one vector per input text, in input order.
pub async fn embed_texts(
    _provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "disabled" => bail!("Embeddings are disabled (embedding.provider = \"disabled\")"),
        "hash" => {
            let embedder = HashEmbedder::new(config.dims);
            Ok(texts.iter().map(|t| embedder.embed(t)).collect())
        }
        "openai" => embed_openai(config, texts).await,
        "ollama" => embed_ollama(config, texts).await,
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

/// Text that gets embedded for a note.
pub fn note_text(title: &str, body: &str) -> String {
    if body.trim().is_empty() {
        title.to_string()
    } else {
        format!("{}\n\n{}", title, body)
    }
}

pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model, requesting
/// `embedding.dims` dimensions. Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;

        // Verify API key is available
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims: config.dims,
        })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Embedding provider using a local Ollama instance (default
/// `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        Ok(Self {
            model,
            dims: config.dims,
        })
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Validate the embedding configuration and build its provider.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    config.validate()?;
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "hash" => Ok(Box::new(HashEmbedder::new(config.dims))),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << (attempt - 1).min(5))
}

/// POST `body` to `url`, retrying 429/5xx and transport errors.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    base_delay: Duration,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(base_delay, attempt);
            tracing::debug!(service, attempt, delay_ms = delay.as_millis() as u64, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", service, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", service, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} embedding failed after retries", service)))
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow!("embedding.model required"))?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
        "dimensions": config.dims,
    });
    let client = http_client(config)?;
    let json = post_with_retry(
        &client,
        OPENAI_URL,
        Some(&api_key),
        &body,
        config.max_retries,
        RETRY_BASE_DELAY,
        "OpenAI",
    )
    .await?;
    parse_openai_response(&json)
}

async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow!("embedding.model required"))?;
    let base = config
        .url
        .as_deref()
        .unwrap_or(DEFAULT_OLLAMA_URL)
        .trim_end_matches('/');

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });
    let client = http_client(config)?;
    let json = post_with_retry(
        &client,
        &format!("{}/api/embed", base),
        None,
        &body,
        config.max_retries,
        RETRY_BASE_DELAY,
        "Ollama",
    )
    .await?;
    parse_ollama_response(&json)
}

fn json_to_vector(value: &serde_json::Value, service: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid {} response: embedding is not an array", service))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid {} response: non-numeric component", service))
        })
        .collect()
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, json_to_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| json_to_vector(e, "Ollama"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::{Matcher, Server};

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(RETRY_BASE_DELAY, 1), Duration::from_secs(1));
        assert_eq!(backoff(RETRY_BASE_DELAY, 3), Duration::from_secs(4));
        assert_eq!(backoff(RETRY_BASE_DELAY, 6), Duration::from_secs(32));
        assert_eq!(backoff(RETRY_BASE_DELAY, 10), Duration::from_secs(32));
        assert_eq!(backoff(Duration::ZERO, 4), Duration::ZERO);
    }

    fn ollama_config(url: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".into(),
            model: Some("nomic-embed-text".into()),
            dims: 2,
            url: Some(format!("{}/", url)),
            max_retries: 0,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_ollama_embed_against_server() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embed")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "nomic-embed-text",
                "input": ["first", "second"],
            })))
            .with_status(200)
            .with_body(r#"{"embeddings": [[1.0, 0.0], [0.0, 1.0]]}"#)
            .create_async()
            .await;

        let config = ollama_config(&server.url());
        let provider = create_provider(&config).unwrap();
        let texts = vec!["first".to_string(), "second".to_string()];
        let vecs = embed_texts(provider.as_ref(), &config, &texts).await.unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mut server = Server::new_async().await;
        let unavailable = server
            .mock("POST", "/v1/embeddings")
            .with_status(503)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(r#"{"data": [{"index": 0, "embedding": [0.5, 0.5]}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/v1/embeddings", server.url());
        let json = post_with_retry(
            &client,
            &url,
            Some("sk-test"),
            &serde_json::json!({ "input": ["x"] }),
            2,
            Duration::ZERO,
            "OpenAI",
        )
        .await
        .unwrap();
        assert_eq!(parse_openai_response(&json).unwrap(), vec![vec![0.5, 0.5]]);
        unavailable.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embed")
            .with_status(429)
            .with_body("slow down")
            .expect(3)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/api/embed", server.url());
        let err = post_with_retry(
            &client,
            &url,
            None,
            &serde_json::json!({}),
            2,
            Duration::ZERO,
            "Ollama",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("429"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_fails_fast() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embed")
            .with_status(400)
            .with_body("model not found")
            .expect(1)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/api/embed", server.url());
        let err = post_with_retry(
            &client,
            &url,
            None,
            &serde_json::json!({}),
            3,
            Duration::ZERO,
            "Ollama",
        )
        .await
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("model not found"));
        mock.assert_async().await;
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        assert!(parse_openai_response(&serde_json::json!({})).is_err());
        let bad = serde_json::json!({ "data": [{ "embedding": [1.0, "x"] }] });
        assert!(parse_openai_response(&bad).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25], [1.0, 2.0]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0], vec![0.5, 0.25]);
        assert!(parse_ollama_response(&serde_json::json!({ "embeddings": [1] })).is_err());
    }

    #[test]
    fn test_create_provider() {
        let config = EmbeddingConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), HashEmbedder::MODEL_NAME);
        assert_eq!(provider.dims(), 384);

        let disabled = EmbeddingConfig {
            provider: "disabled".into(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(create_provider(&disabled).unwrap().model_name(), "disabled");

        let ollama = EmbeddingConfig {
            provider: "ollama".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&ollama).is_err());

        let unknown = EmbeddingConfig {
            provider: "magic".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&unknown).is_err());
    }

    #[tokio::test]
    async fn test_hash_embed_texts() {
        let config = EmbeddingConfig {
            dims: 16,
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let vecs = embed_texts(provider.as_ref(), &config, &texts).await.unwrap();
        assert_eq!(vecs.len(), 2);
        assert!(vecs.iter().all(|v| v.len() == 16));

        let q = embed_query(provider.as_ref(), &config, "alpha beta").await.unwrap();
        assert_eq!(q, vecs[0]);
    }

    #[tokio::test]
    async fn test_disabled_embed_fails() {
        let config = EmbeddingConfig {
            provider: "disabled".into(),
            ..EmbeddingConfig::default()
        };
        let result = embed_query(&DisabledProvider, &config, "x").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_note_text() {
        assert_eq!(note_text("Title", "  "), "Title");
        assert_eq!(note_text("Title", "Body"), "Title\n\nBody");
    }
}
