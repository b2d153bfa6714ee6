//! Transport seam.
//!
//! The protocol core never talks to the network directly. Every call goes
//! through a [`Transport`], which hands back the raw status code and body so
//! non-2xx answers can be surfaced as soft failures.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call did not complete within its timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Target URL
        url: String,
        /// Timeout that expired
        timeout: Duration,
    },

    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Response body could not be read.
    #[error("body error: {0}")]
    Body(String),
}

/// HTTP method used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
        })
    }
}

/// Ordered header list. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// The JSON content headers sent with every call.
    pub fn json() -> Self {
        let mut headers = Self::new();
        headers.insert("Content-Type", "application/json");
        headers.insert("charset", "utf-8");
        headers
    }

    /// Insert or replace a header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Header value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// Check whether a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Fully-qualified endpoint URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// JSON body text, if any
    pub body: Option<String>,
    /// Bound on the whole call
    pub timeout: Duration,
}

/// Raw response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code as sent by the server
    pub status: u16,
    /// Body text as sent by the server
    pub body: String,
}

impl HttpResponse {
    /// Build a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// Sends one request and returns the raw response.
///
/// Implementations must not retry and must preserve the raw status code and
/// body text.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Send a request, bounding it by `request.timeout`.
///
/// The timeout is enforced here regardless of whether the transport honors
/// it; expiry yields [`TransportError::Timeout`].
pub async fn send_with_timeout(
    transport: &dyn Transport,
    request: HttpRequest,
) -> Result<HttpResponse, TransportError> {
    let url = request.url.clone();
    let method = request.method;
    let timeout = request.timeout;

    tracing::debug!("{} {}", method, url);

    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} {} timed out after {:?}", method, url, timeout);
            Err(TransportError::Timeout { url, timeout })
        },
    }
}
