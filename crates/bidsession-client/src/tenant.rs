//! Tenant context and the collaborators that resolve it.
//!
//! Tenant metadata, the local key pair, and user profiles live outside the
//! protocol core. The client reaches them only through [`TenantResolver`] and
//! [`ProfileLookup`].

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bidsession_crypto::KeyPair;
use serde::{Deserialize, Serialize};

use crate::error::{ProfileLookupError, TenantResolutionError};

/// Caller-supplied tenant identity.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantInfo {
    /// Tenant DNS name (routing key for the resolver)
    pub dns: String,
    /// Community within the tenant
    pub community_name: String,
    /// License key, sent encrypted with each request
    pub license_key: String,
}

impl fmt::Debug for TenantInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantInfo")
            .field("dns", &self.dns)
            .field("community_name", &self.community_name)
            .finish_non_exhaustive()
    }
}

/// Community metadata resolved for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityInfo {
    /// Community id
    pub community_id: String,
    /// Community name (used in admin console paths)
    pub community_name: String,
    /// Community public key (base64), counterpart for magic link calls
    pub community_public_key: String,
    /// Tenant routing tag
    pub tenant_tag: String,
}

/// Service-discovery map for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDirectory {
    /// Admin console base URL
    pub admin_console_url: String,
    /// Sessions service base URL
    pub sessions_url: String,
}

impl ServiceDirectory {
    /// Endpoint publishing the sessions service public key.
    pub fn session_keys_url(&self) -> String {
        format!("{}/publickeys", self.sessions_url)
    }
}

/// Everything one call needs about its tenant.
///
/// Resolved once per call and treated as read-only input.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Caller-supplied tenant identity
    pub tenant: TenantInfo,
    /// Local process key pair
    pub key_pair: Arc<KeyPair>,
    /// Community metadata
    pub community: CommunityInfo,
    /// Service endpoints
    pub services: ServiceDirectory,
}

impl TenantContext {
    /// License key for this tenant.
    pub fn license_key(&self) -> &str {
        &self.tenant.license_key
    }
}

/// Account data returned by profile lookup. Opaque to the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountData(pub serde_json::Value);

/// Resolves tenant metadata and the local key pair.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Community info (id, name, public key, tenant tag).
    async fn resolve_community(
        &self,
        tenant: &TenantInfo,
    ) -> Result<CommunityInfo, TenantResolutionError>;

    /// Service-discovery map for the tenant.
    async fn resolve_service_map(
        &self,
        tenant: &TenantInfo,
    ) -> Result<ServiceDirectory, TenantResolutionError>;

    /// Process-wide key pair, loaded once at startup.
    fn local_key_pair(&self) -> Arc<KeyPair>;
}

/// Looks up user accounts by decentralized identifier.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Account data for `did`, or `None` if no such user exists.
    async fn fetch_by_did(
        &self,
        tenant: &TenantInfo,
        did: &str,
        include_devices: bool,
    ) -> Result<Option<AccountData>, ProfileLookupError>;
}

/// Resolve a full [`TenantContext`] through a resolver.
pub async fn resolve_context(
    resolver: &dyn TenantResolver,
    tenant: &TenantInfo,
) -> Result<TenantContext, TenantResolutionError> {
    let community = resolver.resolve_community(tenant).await?;
    let services = resolver.resolve_service_map(tenant).await?;

    Ok(TenantContext {
        tenant: tenant.clone(),
        key_pair: resolver.local_key_pair(),
        community,
        services,
    })
}
