use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use stagepass_core::{CoreError, CoreResult};
use std::time::Duration;
use tracing::debug;

/// Thin reqwest wrapper shared by the service clients.
///
/// Owns the base URL and maps transport failures and non-2xx statuses onto
/// `CoreError` so callers only ever see the shared taxonomy.
#[derive(Clone)]
pub struct ServiceClient {
    name: &'static str,
    base_url: String,
    client: Client,
}

impl ServiceClient {
    pub fn new(name: &'static str, base_url: &str, timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stagepass/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::ServiceUnavailable(format!("{} client: {}", name, e)))?;

        Ok(Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path))
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }

    /// Send and fail on any non-2xx status
    pub async fn send(&self, request: RequestBuilder) -> CoreResult<Response> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("{} answered {}: {}", self.name, status, body);
        Err(status_error(status, &body))
    }

    /// Send and decode a JSON body
    pub async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> CoreResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::ServiceUnavailable(format!("malformed {} response: {}", self.name, e)))
    }

    fn transport_error(&self, err: reqwest::Error) -> CoreError {
        if err.is_timeout() {
            CoreError::ServiceUnavailable(format!("{} timed out", self.name))
        } else {
            CoreError::ServiceUnavailable(format!("{} unreachable: {}", self.name, err))
        }
    }
}

/// Map a non-2xx answer onto the shared taxonomy. 4xx reasons are kept
/// verbatim so they can be shown to the user.
pub fn status_error(status: StatusCode, body: &str) -> CoreError {
    let message = server_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    match status {
        StatusCode::UNAUTHORIZED => CoreError::Unauthenticated(message),
        StatusCode::NOT_FOUND => CoreError::NotFound(message),
        s if s.is_client_error() => CoreError::Rejected {
            status: s.as_u16(),
            reason: message,
        },
        s => CoreError::ServiceUnavailable(format!("{}: {}", s.as_u16(), message)),
    }
}

/// `message` or `error` from a JSON body, otherwise the raw text
fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for field in ["message", "error"] {
            if let Some(Value::String(text)) = map.get(field) {
                return Some(text.clone());
            }
        }
    }
    Some(trimmed.to_string())
}
