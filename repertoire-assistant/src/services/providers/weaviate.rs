//! Weaviate vector store client.
//!
//! Searches run through the GraphQL `Get` endpoint with a `nearVector`
//! clause. The corpus collection carries the Repertoire metadata as flat text
//! properties plus a nested `metadata { filename }` object.

use super::{ensure_success, ProviderError, VectorStore};
use crate::models::RetrievedPassage;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::observability::TracedClientExt;
use std::time::Duration;

/// Default corpus collection (text-embedding-3-small, 1536 dimensions).
pub const DEFAULT_COLLECTION: &str = "U5a280054_textembedding3small_1536";

/// Weaviate client configuration.
#[derive(Debug, Clone)]
pub struct WeaviateConfig {
    pub url: String,
    pub api_key: Secret<String>,
    pub collection: String,
    /// Property holding the passage body.
    pub text_property: String,
    pub timeout: Duration,
}

/// Vector search over a Weaviate collection.
pub struct WeaviateVectorStore {
    config: WeaviateConfig,
    client: Client,
}

/// GraphQL names are interpolated into the query, so they must be identifiers.
fn is_graphql_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Cloud clusters are often given as a bare host; those default to HTTPS.
fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

impl WeaviateVectorStore {
    pub fn new(mut config: WeaviateConfig) -> Result<Self, ProviderError> {
        if config.url.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Weaviate URL not configured".to_string(),
            ));
        }
        for name in [&config.collection, &config.text_property] {
            if !is_graphql_name(name) {
                return Err(ProviderError::NotConfigured(format!(
                    "Invalid Weaviate identifier: {:?}",
                    name
                )));
            }
        }

        config.url = with_scheme(&config.url);
        if reqwest::Url::parse(&config.url).is_err() {
            return Err(ProviderError::NotConfigured(format!(
                "Invalid Weaviate URL: {:?}",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn search_query(&self, vector: &[f32], limit: usize) -> Result<String, ProviderError> {
        let vector = serde_json::to_string(vector)
            .map_err(|e| ProviderError::InvalidRequest(format!("Unserializable vector: {}", e)))?;

        Ok(format!(
            "{{ Get {{ {collection}(nearVector: {{vector: {vector}}}, limit: {limit}) {{ \
             {text} title part section intro_note metadata {{ filename }} \
             _additional {{ distance }} }} }} }}",
            collection = self.config.collection,
            text = self.config.text_property,
        ))
    }

    fn passage_from(&self, object: &Value) -> RetrievedPassage {
        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let distance = object
            .pointer("/_additional/distance")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);

        RetrievedPassage {
            text: field(&self.config.text_property),
            title: field("title"),
            part: field("part"),
            section: field("section"),
            intro_note: field("intro_note"),
            source_filename: object
                .pointer("/metadata/filename")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score: (1.0 - distance) as f32,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[async_trait]
impl VectorStore for WeaviateVectorStore {
    fn name(&self) -> &'static str {
        "weaviate"
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedPassage>, ProviderError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = self.search_query(vector, limit)?;

        tracing::debug!(
            collection = %self.config.collection,
            dimensions = vector.len(),
            limit,
            "Searching vector store"
        );

        let response = self
            .client
            .traced_post(&self.url("v1/graphql"))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let body: GraphQlResponse = ensure_success(response, "Weaviate")
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(ProviderError::ApiError(format!(
                "Weaviate GraphQL error: {}",
                messages.join("; ")
            )));
        }

        let objects = body
            .data
            .as_ref()
            .and_then(|d| d.pointer(&format!("/Get/{}", self.config.collection)))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let passages: Vec<RetrievedPassage> =
            objects.iter().map(|o| self.passage_from(o)).collect();

        tracing::debug!(results = passages.len(), "Vector search finished");
        Ok(passages)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .traced_get(&self.url("v1/.well-known/ready"))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        ensure_success(response, "Weaviate").await.map(|_| ())
    }
}
