//! HTTP transport capability.
//!
//! Everything above this layer talks in terms of [`Request`] and [`Response`];
//! only [`ReqwestTransport`] knows about the concrete HTTP client. Tests swap
//! in a scripted transport through the [`HttpTransport`] trait.

use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use reqwest::{header, multipart, Client};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::envelope::Envelope;

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// A single part of a multipart form body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

/// Who the `Authorization` header should speak for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Whatever access token the session holds when the request goes out.
    Session,
    /// A bearer token chosen by the auth layer itself (refresh token, retry token).
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/auth/login`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    pub credentials: Credentials,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Body::Empty,
            credentials: Credentials::Session,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = Body::Multipart(parts);
        self
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    /// Pin the bearer token instead of using the session's access token.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.credentials = Credentials::Bearer(token.into());
        self
    }

    /// Set a header, replacing any existing value (names compare case-insensitively).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as an API envelope, if it is one.
    pub fn envelope<T: DeserializeOwned>(&self) -> Option<Envelope<T>> {
        serde_json::from_str(&self.body).ok()
    }

    /// A 401 whose `errors.auth` names an expired token. Only these are
    /// recovered by refreshing; any other 401 reaches the caller untouched.
    pub fn is_expired_token(&self) -> bool {
        if self.status != 401 {
            return false;
        }
        self.envelope::<serde_json::Value>()
            .and_then(|envelope| envelope.errors)
            .map(|errors| {
                errors
                    .get("auth")
                    .iter()
                    .any(|message| message.contains("expired token"))
            })
            .unwrap_or(false)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Sends requests and hands back the raw status and body.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

/// Production transport on top of `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_form(parts: Vec<FormPart>) -> Result<multipart::Form, TransportError> {
        let mut form = multipart::Form::new();
        for part in parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file = multipart::Part::bytes(bytes).file_name(file_name);
                    if let Some(mime) = mime {
                        file = file.mime_str(&mime)?;
                    }
                    form.part(name, file)
                }
            };
        }
        Ok(form)
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, request.path);
            debug!(method = %request.method, url = %url, "Sending request");

            let mut builder = match request.method {
                Method::Get => self.client.get(&url),
                Method::Post => self.client.post(&url),
            };
            builder = builder.header(header::ACCEPT, "application/json");
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match request.body {
                Body::Empty => builder,
                Body::Json(value) => builder.json(&value),
                Body::Multipart(parts) => builder.multipart(Self::build_form(parts)?),
            };

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(Response { status, body })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expired_token_detection() {
        let expired = Response::new(
            401,
            json!({"success": false, "errors": {"auth": ["Invalid or expired token"]}}).to_string(),
        );
        assert!(expired.is_expired_token());

        let bad_credentials = Response::new(
            401,
            json!({"success": false, "errors": {"auth": ["Invalid username or password"]}})
                .to_string(),
        );
        assert!(!bad_credentials.is_expired_token());

        // Refresh token expiry is not the access token expiring
        let refresh_expired = Response::new(
            401,
            json!({"errors": {"auth": ["Invalid or expired refresh token"]}}).to_string(),
        );
        assert!(!refresh_expired.is_expired_token());

        let wrong_status = Response::new(
            403,
            json!({"errors": {"auth": ["Invalid or expired token"]}}).to_string(),
        );
        assert!(!wrong_status.is_expired_token());

        assert!(!Response::new(401, "<html>Unauthorized</html>").is_expired_token());
        assert!(!Response::new(401, "").is_expired_token());
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut request = Request::get("/profiles");
        request.set_header("authorization", "Bearer old");
        request.set_header("Authorization", "Bearer new");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header("AUTHORIZATION"), Some("Bearer new"));
    }

    #[test]
    fn test_bearer_pins_credentials() {
        let request = Request::post("/auth/refresh").bearer("R1");
        assert_eq!(request.credentials, Credentials::Bearer("R1".to_string()));
        assert_eq!(Request::get("/").credentials, Credentials::Session);
    }

    #[test]
    fn test_reqwest_transport_trims_base_url() {
        let transport = ReqwestTransport::new("http://localhost:5000/api/", 5)
            .expect("client should build");
        assert_eq!(transport.base_url(), "http://localhost:5000/api");
    }
}
