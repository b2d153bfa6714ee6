//! HTTP transport backed by `reqwest`.
//!
//! Thin layer that only moves bytes. Protocol logic stays in
//! [`crate::SessionClient`].

use async_trait::async_trait;

use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// [`Transport`] over a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default connection pool.
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Connection(format!("client creation failed: {e}")))?;
        Ok(Self { http })
    }

    /// Wrap an existing client (custom TLS roots, proxies, ...).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest { method, url, headers, body, timeout } = request;

        let mut builder = self.http.request(to_reqwest_method(method), &url).timeout(timeout);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { url: url.clone(), timeout }
            } else {
                TransportError::Connection(format!("{method} {url} failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout { url: url.clone(), timeout }
            } else {
                TransportError::Body(format!("read failed: {e}"))
            }
        })?;

        Ok(HttpResponse { status, body })
    }
}
