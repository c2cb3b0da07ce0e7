use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::ChatRequest;
use crate::util::is_local_endpoint_url;
use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens the event stream of one assistant turn.
///
/// Dropping the returned stream aborts the request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let request_url = self.api_url.clone();
        let payload = serde_json::to_value(request)?;

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        let mut builder = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&payload);

        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        tracing::debug!(url = %request_url, status = %response.status(), "stream opened");

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local chat endpoint '{}': {}. Start the backend or update CHAT_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach chat endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("chat request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "chat endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("chat request to '{}' failed: {}", request_url, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(api_url: &str) -> Config {
        Config {
            api_url: api_url.to_string(),
            api_token: None,
            dev_mode: true,
            user_role: None,
            log_filter: "info".to_string(),
            log_path: None::<PathBuf>,
            connect_timeout_secs: 1,
        }
    }

    #[test]
    fn test_client_detects_local_endpoint() {
        let client = ApiClient::new(&config("http://127.0.0.1:8000/api/chat/stream")).unwrap();
        assert!(client.is_local_endpoint());
        let client = ApiClient::new(&config("https://chat.example.com/api/chat/stream")).unwrap();
        assert!(!client.is_local_endpoint());
    }

    #[tokio::test]
    async fn test_unreachable_local_endpoint_names_the_backend() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let client = ApiClient::new(&config("http://127.0.0.1:9/api/chat/stream")).unwrap();
        let error = match client.open_stream(&ChatRequest::new("hi")).await {
            Ok(_) => panic!("expected connection failure"),
            Err(error) => error,
        };
        assert!(error.to_string().contains("127.0.0.1:9"));
    }
}
