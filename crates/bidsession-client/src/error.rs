//! Error types for the session exchange client.
//!
//! Hard failures only. Application-level rejections (non-2xx answers from
//! session endpoints) are ordinary values, see [`crate::Outcome`].

use bidsession_crypto::CryptoError;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors from fetching a service public key.
///
/// `Clone` so a single in-flight fetch can hand the same failure to every
/// waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFetchError {
    /// The key endpoint could not be reached (including timeouts)
    #[error("key fetch transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The key endpoint answered with a non-200 status
    #[error("key endpoint {url} returned status {status}")]
    Status {
        /// Key endpoint URL
        url: String,
        /// Status code received
        status: u16,
    },

    /// The response did not carry a public key
    #[error("malformed key response: {reason}")]
    Malformed {
        /// What was wrong with the response
        reason: String,
    },
}

/// Tenant or community metadata could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tenant resolution failed: {reason}")]
pub struct TenantResolutionError {
    /// Reason reported by the resolver
    pub reason: String,
}

impl TenantResolutionError {
    /// Build an error from any message.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// User profile lookup failed (not-found is not an error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("profile lookup failed: {reason}")]
pub struct ProfileLookupError {
    /// Reason reported by the lookup service
    pub reason: String,
}

impl ProfileLookupError {
    /// Build an error from any message.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Hard failures of a session exchange call.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Key agreement, encryption, or decryption failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The service public key could not be fetched
    #[error(transparent)]
    KeyFetch(#[from] KeyFetchError),

    /// The call itself failed or timed out
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Tenant context could not be resolved
    #[error(transparent)]
    TenantResolution(#[from] TenantResolutionError),

    /// Account enrichment failed
    #[error(transparent)]
    ProfileLookup(#[from] ProfileLookupError),

    /// A success response could not be interpreted
    #[error("malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong with the response
        reason: String,
    },

    /// A request payload could not be serialized
    #[error("payload serialization failed: {reason}")]
    Serialization {
        /// Serializer message
        reason: String,
    },
}

impl SessionError {
    /// Returns true if the call ran out of time, either on the call itself
    /// or while fetching the service key.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Timeout { .. })
                | Self::KeyFetch(KeyFetchError::Transport(TransportError::Timeout { .. }))
        )
    }

    /// Returns true if the response must be treated as untrustworthy.
    ///
    /// Decryption failures and malformed success bodies mean the whole
    /// response is rejected; nothing from it may be used.
    pub fn is_untrusted_response(&self) -> bool {
        match self {
            Self::Crypto(err) => err.is_untrusted_input(),
            Self::MalformedResponse { .. } => true,
            _ => false,
        }
    }
}
