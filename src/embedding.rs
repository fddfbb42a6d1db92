//! HTTP embedding providers and the configured provider chain.
//!
//! - **[`OpenAiCompatibleProvider`]**: `POST {base_url}/embeddings` with
//!   `{ input, model }` and a bearer key. Works with OpenAI and with
//!   compatible gateways such as DashScope.
//! - **[`ServerProvider`]**: `POST {base_url}/api/embeddings` with
//!   `{ text }` against another docrag server, for clients that must not
//!   hold provider credentials.
//!
//! Use [`create_embedder`] to build a [`ChainedEmbedder`] from the
//! `[embedding]` config section: primary, then secondary, then the local
//! fallback.
//!
//! # Retry Strategy
//!
//! Both providers retry transient errors up to `embedding.max_retries`
//! times:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use docrag_core::embedding::{ChainedEmbedder, EmbeddingError, EmbeddingProvider};

use crate::config::{EmbeddingConfig, ProviderConfig, ProviderKind};

/// Provider for any OpenAI-shaped `/embeddings` endpoint.
pub struct OpenAiCompatibleProvider {
    name: String,
    url: String,
    model: String,
    api_key_env: String,
    expected_dimension: Option<usize>,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from one `[embedding.*]` entry.
    ///
    /// The API key is not read here; a missing key surfaces as
    /// [`EmbeddingError::MissingCredentials`] on each call so the chain can
    /// skip the provider without a network round-trip.
    pub fn new(provider: &ProviderConfig, settings: &EmbeddingConfig) -> Result<Self> {
        let model = provider
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding model required for openai provider"))?;
        let api_key_env = provider
            .api_key_env
            .clone()
            .ok_or_else(|| anyhow::anyhow!("api_key_env required for openai provider"))?;

        Ok(Self {
            name: model.clone(),
            url: format!("{}/embeddings", provider.base_url.trim_end_matches('/')),
            model,
            api_key_env,
            expected_dimension: provider.expected_dimension,
            max_retries: settings.max_retries,
            client: http_client(settings)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EmbeddingError::MissingCredentials(self.api_key_env.clone()))?;

        let body = json!({
            "input": text,
            "model": self.model,
        });

        let json = post_with_retry(
            &self.client,
            &self.url,
            Some(&api_key),
            &body,
            self.max_retries,
        )
        .await?;

        let vector = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .and_then(parse_vector)
            .ok_or_else(|| {
                EmbeddingError::MalformedResponse("missing data[0].embedding".to_string())
            })?;

        check_dimension(vector, self.expected_dimension)
    }
}

/// Provider that delegates to another docrag server's embedding route.
pub struct ServerProvider {
    name: String,
    url: String,
    expected_dimension: Option<usize>,
    max_retries: u32,
    client: reqwest::Client,
}

impl ServerProvider {
    pub fn new(provider: &ProviderConfig, settings: &EmbeddingConfig) -> Result<Self> {
        let base = provider.base_url.trim_end_matches('/');
        Ok(Self {
            name: format!("server:{}", base),
            url: format!("{}/api/embeddings", base),
            expected_dimension: provider.expected_dimension,
            max_retries: settings.max_retries,
            client: http_client(settings)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for ServerProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = json!({ "text": text });
        let json = post_with_retry(&self.client, &self.url, None, &body, self.max_retries).await?;

        let vector = json
            .get("embedding")
            .and_then(parse_vector)
            .ok_or_else(|| EmbeddingError::MalformedResponse("missing embedding".to_string()))?;

        check_dimension(vector, self.expected_dimension)
    }
}

fn http_client(settings: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()?)
}

/// POST `body` as JSON and return the parsed success body, retrying
/// rate limits, server errors, and network failures.
async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
) -> Result<Value, EmbeddingError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()));
                }

                let message = response.text().await.unwrap_or_default();
                let err = EmbeddingError::Api {
                    status: status.as_u16(),
                    message,
                };

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    debug!(url, attempt, status = status.as_u16(), "retryable embedding error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                debug!(url, attempt, error = %e, "embedding request failed");
                last_err = Some(EmbeddingError::Network(e.to_string()));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| EmbeddingError::Network("embedding failed after retries".to_string())))
}

/// A JSON array of numbers as an `f32` vector; `None` if any element is not
/// a number.
fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn check_dimension(vector: Vec<f32>, expected: Option<usize>) -> Result<Vec<f32>, EmbeddingError> {
    match expected {
        Some(expected) if vector.len() != expected => Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(vector),
    }
}

/// Build a single provider from its config entry.
pub fn create_provider(
    provider: &ProviderConfig,
    settings: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match provider.kind {
        ProviderKind::Openai => Ok(Box::new(OpenAiCompatibleProvider::new(provider, settings)?)),
        ProviderKind::Server => Ok(Box::new(ServerProvider::new(provider, settings)?)),
    }
}

/// Build the configured chain: primary, secondary, then local fallback.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<ChainedEmbedder> {
    let providers = config
        .providers()
        .map(|(_, p)| create_provider(p, config))
        .collect::<Result<Vec<_>>>()?;
    Ok(ChainedEmbedder::new(providers))
}
