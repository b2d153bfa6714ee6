//! Client configuration.

use std::time::Duration;

/// Default bound on every outbound call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of a cached service public key (10 minutes).
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Configuration for [`crate::SessionClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout applied to every network call, including public key fetches
    pub request_timeout: Duration,
    /// How long a fetched service public key stays fresh
    pub key_cache_ttl: Duration,
    /// Application tag embedded in every request id
    pub app_id: String,
    /// Authentication page advertised in new session origins
    pub auth_page: String,
    /// `createdBy` marker sent with magic link requests
    pub created_by: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            key_cache_ttl: DEFAULT_KEY_CACHE_TTL,
            app_id: "fixme".to_string(),
            auth_page: "blockid://authenticate".to_string(),
            created_by: "helper-files".to_string(),
        }
    }
}

impl ClientConfig {
    /// Override the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the key cache lifetime.
    #[must_use]
    pub fn with_key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache_ttl = ttl;
        self
    }

    /// Override the request id application tag.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    /// Override the advertised authentication page.
    #[must_use]
    pub fn with_auth_page(mut self, auth_page: impl Into<String>) -> Self {
        self.auth_page = auth_page.into();
        self
    }

    /// Override the magic link `createdBy` marker.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }
}
