//! Time-bounded cache of service public keys.
//!
//! Maps an endpoint (the key-publishing URL) to the public key it currently
//! publishes. Misses and expired entries trigger a fetch; concurrent callers
//! for the same endpoint share that one in-flight fetch.
//!
//! # Invariants
//!
//! - At most one outstanding fetch per endpoint
//! - Every waiter on a fetch receives the same result
//! - Failed fetches (including timeouts) are never stored
//! - Expiry is checked on read; there is no background sweep
//! - Every fetch is bounded by the cache's fetch timeout, whatever the fetcher

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use crate::{
    config::DEFAULT_REQUEST_TIMEOUT,
    env::Environment,
    error::KeyFetchError,
    transport::{Headers, HttpRequest, Method, Transport, TransportError, send_with_timeout},
};

/// Fetches the public key currently published at an endpoint.
#[async_trait]
pub trait PublicKeyFetcher: Send + Sync {
    /// Fetch the key published at `endpoint`.
    async fn fetch_public_key(&self, endpoint: &str) -> Result<String, KeyFetchError>;
}

/// Fetches keys over HTTP: `GET <endpoint>` answering `{"publicKey": "..."}`.
pub struct ServiceKeyFetcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl ServiceKeyFetcher {
    /// Create a fetcher that bounds each fetch by `timeout`.
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[derive(Deserialize)]
struct PublishedKey {
    #[serde(rename = "publicKey")]
    public_key: String,
}

#[async_trait]
impl PublicKeyFetcher for ServiceKeyFetcher {
    async fn fetch_public_key(&self, endpoint: &str) -> Result<String, KeyFetchError> {
        let request = HttpRequest {
            method: Method::Get,
            url: endpoint.to_string(),
            headers: Headers::json(),
            body: None,
            timeout: self.timeout,
        };

        let response = send_with_timeout(self.transport.as_ref(), request).await?;
        if response.status != 200 {
            return Err(KeyFetchError::Status {
                url: endpoint.to_string(),
                status: response.status,
            });
        }

        let published: PublishedKey = serde_json::from_str(&response.body)
            .map_err(|e| KeyFetchError::Malformed { reason: e.to_string() })?;

        Ok(published.public_key)
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<String, KeyFetchError>>>;

enum Slot<I> {
    Ready { value: String, fetched_at: I },
    Pending(SharedFetch),
}

enum Lookup {
    Fresh(String),
    InFlight(SharedFetch),
    Miss,
}

/// Public key cache with single-flight refresh.
///
/// Owned by one client instance; two clients never share entries.
pub struct PublicKeyCache<E: Environment> {
    env: E,
    ttl: Duration,
    fetch_timeout: Duration,
    fetcher: Arc<dyn PublicKeyFetcher>,
    slots: Mutex<HashMap<String, Slot<E::Instant>>>,
}

impl<E: Environment> PublicKeyCache<E> {
    /// Create an empty cache. Fetches are bounded by
    /// [`DEFAULT_REQUEST_TIMEOUT`] until overridden.
    pub fn new(env: E, fetcher: Arc<dyn PublicKeyFetcher>, ttl: Duration) -> Self {
        Self {
            env,
            ttl,
            fetch_timeout: DEFAULT_REQUEST_TIMEOUT,
            fetcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Override the bound on each fetch.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Bound on each fetch.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Public key for `endpoint`, fetching it if missing or expired.
    pub async fn get(&self, endpoint: &str) -> Result<String, KeyFetchError> {
        let fetch = {
            let mut slots = self.lock_slots();
            let now = self.env.now();

            let lookup = match slots.get(endpoint) {
                Some(Slot::Ready { value, fetched_at }) if now - *fetched_at < self.ttl => {
                    Lookup::Fresh(value.clone())
                },
                Some(Slot::Pending(fetch)) => Lookup::InFlight(fetch.clone()),
                _ => Lookup::Miss,
            };

            match lookup {
                Lookup::Fresh(value) => {
                    tracing::debug!("public key cache hit for {}", endpoint);
                    return Ok(value);
                },
                Lookup::InFlight(fetch) => {
                    tracing::debug!("joining in-flight key fetch for {}", endpoint);
                    fetch
                },
                Lookup::Miss => {
                    tracing::debug!("public key cache miss for {}", endpoint);
                    let fetch = self.start_fetch(endpoint);
                    slots.insert(endpoint.to_string(), Slot::Pending(fetch.clone()));
                    fetch
                },
            }
        };

        let result = fetch.clone().await;
        self.settle(endpoint, &fetch, &result);
        result
    }

    /// Drop the entry for `endpoint`. An in-flight fetch keeps running for
    /// its current waiters but its result is not stored.
    pub fn invalidate(&self, endpoint: &str) {
        self.lock_slots().remove(endpoint);
    }

    /// Number of endpoints with a stored or in-flight entry.
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// Check if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    fn start_fetch(&self, endpoint: &str) -> SharedFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let endpoint = endpoint.to_string();
        let timeout = self.fetch_timeout;

        // Timeout lives inside the shared future so expiry settles like any failure
        async move {
            match tokio::time::timeout(timeout, fetcher.fetch_public_key(&endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(KeyFetchError::Transport(TransportError::Timeout {
                    url: endpoint,
                    timeout,
                })),
            }
        }
        .boxed()
        .shared()
    }

    // Only the waiter that finds its own fetch still pending writes the slot
    fn settle(&self, endpoint: &str, fetch: &SharedFetch, result: &Result<String, KeyFetchError>) {
        let mut slots = self.lock_slots();

        let is_current =
            matches!(slots.get(endpoint), Some(Slot::Pending(current)) if current.ptr_eq(fetch));
        if !is_current {
            return;
        }

        match result {
            Ok(value) => {
                slots.insert(
                    endpoint.to_string(),
                    Slot::Ready { value: value.clone(), fetched_at: self.env.now() },
                );
            },
            Err(err) => {
                tracing::warn!("public key fetch for {} failed: {}", endpoint, err);
                slots.remove(endpoint);
            },
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot<E::Instant>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
