//! Remote document-store gateways.
//!
//! The remote store is an eventually consistent document database reached
//! over HTTP. Every upload is an upsert keyed by record id, which is what
//! makes at-least-once delivery safe: resubmitting a batch overwrites the
//! same documents instead of duplicating them. Each entity has one gateway
//! owning its wire format; all gateways share the [`DocStoreClient`]
//! plumbing.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::util::normalize_text_option;

mod favorites;
mod reviews;
mod routes;

pub use favorites::FavoriteGateway;
pub use reviews::ReviewGateway;
pub use routes::RouteGateway;

/// Errors surfaced by the remote gateways
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid gateway configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Invalid remote document: {0}")]
    InvalidDocument(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Shared HTTP plumbing for the remote document store
#[derive(Clone)]
pub struct DocStoreClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for DocStoreClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DocStoreClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl DocStoreClient {
    /// Create a client for the given base URL, for example
    /// `https://api.example.com`. An empty or schemeless URL is rejected.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let api_key = normalize_text_option(api_key);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    /// Insert or overwrite one document keyed by id
    pub(crate) async fn put_doc<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> GatewayResult<()> {
        let response = self
            .request(Method::PUT, &format!("/v1/collections/{collection}/docs/{id}"))
            .json(doc)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Insert or overwrite many documents in one request
    pub(crate) async fn post_batch<T: Serialize + Sync>(
        &self,
        collection: &str,
        docs: &[T],
    ) -> GatewayResult<()> {
        let response = self
            .request(
                Method::POST,
                &format!("/v1/collections/{collection}/docs:batch"),
            )
            .json(&BatchRequest { documents: docs })
            .send()
            .await?;
        Self::check(response).await
    }

    /// Delete one document. A missing document counts as success; the copy
    /// we wanted gone is already gone.
    pub(crate) async fn delete_doc(&self, collection: &str, id: &str) -> GatewayResult<()> {
        let response = self
            .request(
                Method::DELETE,
                &format!("/v1/collections/{collection}/docs/{id}"),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await
    }

    /// Fetch raw documents matching the given query parameters
    pub(crate) async fn query_docs(
        &self,
        collection: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<Vec<serde_json::Value>> {
        let response = self
            .request(Method::GET, &format!("/v1/collections/{collection}/docs"))
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(parse_api_error(status, &body)));
        }

        let payload = response.json::<QueryResponse>().await?;
        Ok(payload.documents)
    }

    async fn check(response: reqwest::Response) -> GatewayResult<()> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Api(parse_api_error(status, &body)))
    }
}

#[derive(Serialize)]
struct BatchRequest<'a, T> {
    documents: &'a [T],
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    // Plain-text bodies get truncated so a proxy error page cannot flood
    // the log
    let trimmed: String = body.trim().chars().take(180).collect();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> GatewayResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        GatewayError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(GatewayError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

/// Deserialize and convert every document in a query response, skipping the
/// ones that do not fit. One malformed document must never sink the batch
/// it arrived in.
pub(crate) fn decode_documents<D, R>(collection: &str, documents: Vec<serde_json::Value>) -> Vec<R>
where
    D: DeserializeOwned + TryInto<R, Error = GatewayError>,
{
    let mut records = Vec::with_capacity(documents.len());
    for value in documents {
        let doc: D = match serde_json::from_value(value) {
            Ok(doc) => doc,
            Err(error) => {
                tracing::warn!("Skipping malformed {collection} document: {error}");
                continue;
            }
        };
        match doc.try_into() {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!("Skipping invalid {collection} document: {error}");
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_base_url_strips_trailing_slash() {
        let url = normalize_base_url("https://api.example.com/".to_string()).unwrap();
        assert_eq!(url, "https://api.example.com");
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        let status = StatusCode::BAD_REQUEST;
        let body = r#"{"message": "owner is required"}"#;
        assert_eq!(parse_api_error(status, body), "owner is required (400)");
    }

    #[test]
    fn parse_api_error_falls_back_to_body() {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        assert_eq!(parse_api_error(status, ""), "HTTP 500");
        assert_eq!(parse_api_error(status, "boom"), "boom (500)");
    }

    #[test]
    fn parse_api_error_truncates_long_bodies() {
        let status = StatusCode::BAD_GATEWAY;
        let body = "x".repeat(4000);
        let message = parse_api_error(status, &body);
        assert!(message.len() < 200);
        assert!(message.ends_with("(502)"));
    }

    #[test]
    fn client_debug_redacts_api_key() {
        let client = DocStoreClient::new(
            "https://api.example.com",
            Some("secret-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn client_treats_blank_api_key_as_absent() {
        let client = DocStoreClient::new(
            "https://api.example.com",
            Some("   ".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(client.api_key.is_none());
    }
}
