//! Session exchange client
//!
//! Client side of an encrypted session exchange with a remote identity
//! service. A relying party creates an authentication session, the user
//! answers it from another device, and the relying party polls the session
//! until an encrypted response arrives.
//!
//! # Architecture
//!
//! Every call is independent: it resolves its [`TenantContext`], derives a
//! shared key against the service public key, and sends one [`Envelope`].
//! The only state shared across calls is the [`PublicKeyCache`].
//!
//! ```text
//! TenantResolver ─► TenantContext ─┐
//!                                  ├─► EnvelopeBuilder ─► Transport ─► Outcome
//! PublicKeyCache ─► SharedKey ─────┘
//! ```
//!
//! # Components
//!
//! - [`SessionClient`]: Session lifecycle and magic link operations
//! - [`PublicKeyCache`]: TTL cache with single-flight fetches
//! - [`EnvelopeBuilder`]: Authenticated headers and encrypted bodies
//! - [`Transport`], [`TenantResolver`], [`ProfileLookup`]: Injected collaborators
//!
//! # Transport (optional)
//!
//! With the `http` feature enabled, [`http::ReqwestTransport`] provides a
//! production transport over reqwest.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod env;
pub mod envelope;
mod error;
pub mod key_cache;
mod magic_link;
mod session;
mod tenant;
pub mod transport;

#[cfg(feature = "http")]
pub mod http;

pub use config::ClientConfig;
pub use env::{Environment, SystemEnv};
pub use envelope::{Envelope, EnvelopeBuilder, RequestId};
pub use error::{KeyFetchError, ProfileLookupError, SessionError, TenantResolutionError};
pub use key_cache::{PublicKeyCache, PublicKeyFetcher, ServiceKeyFetcher};
pub use magic_link::MagicLinkRequest;
pub use session::{
    AuthenticationRequest, Outcome, PollOptions, Session, SessionClient, SessionOrigin,
    SessionSnapshot, SessionState, SoftFailure, UserData,
};
pub use tenant::{
    AccountData, CommunityInfo, ProfileLookup, ServiceDirectory, TenantContext, TenantInfo,
    TenantResolver, resolve_context,
};
pub use transport::{Headers, HttpRequest, HttpResponse, Method, Transport, TransportError};
