//! Request envelopes.
//!
//! An envelope is the header set plus encrypted body sent with one protocol
//! call. Everything confidential travels encrypted under the call's shared
//! key; only the local public key is sent in cleartext, since the receiver
//! needs it to derive the same key.
//!
//! ```text
//! Content-Type: application/json
//! charset:      utf-8
//! publickey:    <local public key, cleartext>
//! licensekey:   enc({license key})            (when set)
//! requestid:    enc({"ts","appid","uuid"})
//! X-tenantTag:  <tag>                         (when set)
//!
//! {"data": enc(<payload JSON>)}
//! ```

use bidsession_crypto::{SharedKey, decrypt_from_base64, encrypt_to_base64};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{env::Environment, error::SessionError, transport::Headers};

/// Cleartext local public key header.
pub const PUBLIC_KEY_HEADER: &str = "publickey";

/// Encrypted license key header.
pub const LICENSE_KEY_HEADER: &str = "licensekey";

/// Encrypted request id header.
pub const REQUEST_ID_HEADER: &str = "requestid";

/// Multi-tenant routing header.
pub const TENANT_TAG_HEADER: &str = "X-tenantTag";

/// Per-request replay token.
///
/// Serialized as JSON and encrypted before it leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestId {
    /// Unix seconds at creation
    pub ts: u64,
    /// Application tag
    pub appid: String,
    /// Random unique token
    pub uuid: String,
}

impl RequestId {
    /// Fresh request id from the environment's clock and RNG.
    pub fn generate<E: Environment>(env: &E, app_id: &str) -> Self {
        Self {
            ts: env.wall_clock_secs(),
            appid: app_id.to_string(),
            uuid: env.random_uuid().to_string(),
        }
    }
}

/// Encrypted body wrapper: `{"data": "<ciphertext>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBody {
    /// Base64 ciphertext of the payload JSON
    pub data: String,
}

/// Headers and optional body for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Authenticated header set
    pub headers: Headers,
    /// JSON body text, if the call carries a payload
    pub body: Option<String>,
}

/// Builds envelopes under one shared key.
pub struct EnvelopeBuilder<'a> {
    shared_key: &'a SharedKey,
    local_public_key: &'a str,
    app_id: &'a str,
    license_key: Option<&'a str>,
    tenant_tag: Option<&'a str>,
}

impl<'a> EnvelopeBuilder<'a> {
    /// Start an envelope sealed under `shared_key`.
    pub fn new(shared_key: &'a SharedKey, local_public_key: &'a str, app_id: &'a str) -> Self {
        Self { shared_key, local_public_key, app_id, license_key: None, tenant_tag: None }
    }

    /// Send the license key (encrypted).
    #[must_use]
    pub fn license_key(mut self, license_key: &'a str) -> Self {
        self.license_key = Some(license_key);
        self
    }

    /// Add the multi-tenant routing header.
    #[must_use]
    pub fn tenant_tag(mut self, tenant_tag: &'a str) -> Self {
        self.tenant_tag = Some(tenant_tag);
        self
    }

    /// Envelope with an encrypted JSON payload.
    pub fn build<E, T>(&self, env: &E, payload: &T) -> Result<Envelope, SessionError>
    where
        E: Environment,
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_vec(payload)
            .map_err(|e| SessionError::Serialization { reason: e.to_string() })?;
        let data = encrypt_to_base64(&json, self.shared_key, env.nonce())?;

        let body = serde_json::to_string(&EncryptedBody { data })
            .map_err(|e| SessionError::Serialization { reason: e.to_string() })?;

        Ok(Envelope { headers: self.headers(env)?, body: Some(body) })
    }

    /// Envelope for a call without a body (GET).
    pub fn build_empty<E: Environment>(&self, env: &E) -> Result<Envelope, SessionError> {
        Ok(Envelope { headers: self.headers(env)?, body: None })
    }

    fn headers<E: Environment>(&self, env: &E) -> Result<Headers, SessionError> {
        let mut headers = Headers::json();

        if let Some(tag) = self.tenant_tag {
            headers.insert(TENANT_TAG_HEADER, tag);
        }

        headers.insert(PUBLIC_KEY_HEADER, self.local_public_key);

        if let Some(license_key) = self.license_key {
            let sealed = encrypt_to_base64(license_key.as_bytes(), self.shared_key, env.nonce())?;
            headers.insert(LICENSE_KEY_HEADER, sealed);
        }

        let request_id = serde_json::to_vec(&RequestId::generate(env, self.app_id))
            .map_err(|e| SessionError::Serialization { reason: e.to_string() })?;
        let sealed = encrypt_to_base64(&request_id, self.shared_key, env.nonce())?;
        headers.insert(REQUEST_ID_HEADER, sealed);

        Ok(headers)
    }
}

/// Open an encrypted `{"data": ...}` body (receiver side).
pub fn open_body<T: DeserializeOwned>(body: &str, key: &SharedKey) -> Result<T, SessionError> {
    let wrapper: EncryptedBody = serde_json::from_str(body)
        .map_err(|e| SessionError::MalformedResponse { reason: format!("envelope body: {e}") })?;
    open_json(&wrapper.data, key)
}

/// Decrypt a base64 ciphertext and parse the JSON inside.
pub fn open_json<T: DeserializeOwned>(
    ciphertext: &str,
    key: &SharedKey,
) -> Result<T, SessionError> {
    let plaintext = decrypt_from_base64(ciphertext, key)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| SessionError::MalformedResponse { reason: format!("decrypted payload: {e}") })
}
