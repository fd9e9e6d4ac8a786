//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::AgentError;

/// HTTP client for control server communication
pub struct HttpClient {
    client: Client,
    base: Url,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AgentError::ConfigError(format!("Invalid backend URL {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(AgentError::ConfigError(format!(
                "Unsupported backend URL scheme: {}",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            base: parsed,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `segments` below the base URL. Each segment is
    /// percent-encoded, so it can never add path components or a query.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, AgentError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AgentError::ConfigError(format!("Invalid backend URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, AgentError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let response = check_status("GET", response).await?;
        decode(response).await
    }

    /// Make a POST request, discarding the response body
    pub async fn post<B: Serialize>(&self, segments: &[&str], body: &B) -> Result<(), AgentError> {
        self.send_post(segments, body).await?;
        Ok(())
    }

    /// Make a POST request and decode the JSON response
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, AgentError> {
        let response = self.send_post(segments, body).await?;
        decode(response).await
    }

    async fn send_post<B: Serialize>(&self, segments: &[&str], body: &B) -> Result<Response, AgentError> {
        let url = self.endpoint(segments)?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status("POST", response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AgentError> {
    response
        .json()
        .await
        .map_err(|e| AgentError::ServerError(format!("Malformed response body: {}", e)))
}

/// Map a failed send to the retry taxonomy
fn transport_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Unreachable(format!("request timed out: {}", err))
    } else if err.is_connect() || err.is_request() {
        AgentError::Unreachable(err.to_string())
    } else {
        AgentError::HttpError(err)
    }
}

async fn check_status(method: &str, response: Response) -> Result<Response, AgentError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("HTTP {} failed: {} - {}", method, status, body);
    Err(AgentError::ServerError(format!("{}: {}", status, body)))
}
