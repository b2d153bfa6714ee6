//! Session lifecycle client.
//!
//! Every operation is one independent call against the sessions service; the
//! client keeps no per-session state between calls. The lifecycle as seen
//! from here:
//!
//! ```text
//! create_session ──► Created
//! poll_session   ──► AwaitingResponse ──► Authenticated
//!                                     └─► Rejected | Errored   (soft failure)
//! ```
//!
//! Non-2xx answers come back as [`Outcome::Rejected`], not as errors.
//! Cryptographic and transport faults are [`SessionError`]s.

use std::sync::Arc;

use bidsession_crypto::{SharedKey, derive_shared_key_from_base64};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::ClientConfig,
    env::Environment,
    envelope::{Envelope, EnvelopeBuilder, open_json},
    error::SessionError,
    key_cache::{PublicKeyCache, PublicKeyFetcher, ServiceKeyFetcher},
    tenant::{
        AccountData, ProfileLookup, TenantContext, TenantInfo, TenantResolver, resolve_context,
    },
    transport::{Headers, HttpRequest, HttpResponse, Method, Transport, send_with_timeout},
};

/// Client's view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, nobody has responded yet
    Created,
    /// Polled, no authentication response yet
    AwaitingResponse,
    /// A user authenticated the session
    Authenticated,
    /// The service rejected the call
    Rejected,
    /// The service failed the call
    Errored,
}

/// Non-2xx answer from a session endpoint, carried as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    /// Status code as received
    pub status: u16,
    /// Raw response body
    pub message: String,
}

impl SoftFailure {
    fn from_response(response: HttpResponse) -> Self {
        Self { status: response.status, message: response.body }
    }

    /// Server-side failures are `Errored`, everything else `Rejected`.
    pub fn state(&self) -> SessionState {
        if self.status >= 500 { SessionState::Errored } else { SessionState::Rejected }
    }
}

/// Result of a call that reached the service.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The service accepted the call
    Completed(T),
    /// The service answered with an unexpected status
    Rejected(SoftFailure),
}

impl<T> Outcome<T> {
    /// Completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    /// Soft failure, if any.
    pub fn rejection(&self) -> Option<&SoftFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(failure) => Some(failure),
        }
    }

    /// Check if the call completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Convert into a `Result`, soft failure as the error.
    pub fn into_result(self) -> Result<T, SoftFailure> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Rejected(failure) => Err(failure),
        }
    }

    /// Transform the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Rejected(failure) => Outcome::Rejected(failure),
        }
    }
}

/// Where a session came from; shown to the authenticating user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOrigin {
    /// Tenant tag
    pub tag: String,
    /// Admin console URL
    pub url: String,
    /// Community name
    pub community_name: String,
    /// Community id
    pub community_id: String,
    /// Page the authenticator app should open
    pub auth_page: String,
}

#[derive(Serialize)]
struct NewSessionPayload<'a> {
    origin: &'a SessionOrigin,
    scopes: &'a str,
    authtype: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
}

/// A newly created session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque session id
    pub session_id: String,
    /// Origin sent at creation
    pub origin: SessionOrigin,
    /// Requested scopes
    pub scopes: String,
    /// Requested authentication type
    pub auth_type: String,
    /// Always [`SessionState::Created`] for a fresh session
    pub state: SessionState,
    /// Sessions service base URL to poll against
    pub url: String,
    /// Remaining fields of the creation response
    pub fields: Map<String, Value>,
}

/// Decrypted payload posted by the authenticating user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    /// Decentralized identifier of the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    /// All other fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Server state of a session as of one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Status code of the call
    pub status: u16,
    /// Counterpart public key declared by the response
    pub public_key: Option<String>,
    /// Decrypted user payload
    pub user_data: Option<UserData>,
    /// Account enrichment from profile lookup
    pub account_data: Option<AccountData>,
    /// Remaining response fields
    pub fields: Map<String, Value>,
}

impl SessionSnapshot {
    /// `Authenticated` once a user payload is present.
    pub fn state(&self) -> SessionState {
        if self.user_data.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::AwaitingResponse
        }
    }

    /// DID of the authenticated user, if any.
    pub fn did(&self) -> Option<&str> {
        self.user_data.as_ref().and_then(|u| u.did.as_deref())
    }
}

/// Options for [`SessionClient::poll_session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOptions {
    /// Look up the account behind the returned DID
    pub fetch_profile: bool,
    /// Include devices in the account lookup
    pub fetch_devices: bool,
}

/// Payload for [`SessionClient::authenticate_session`].
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationRequest {
    /// Authentication data (opaque to this client)
    pub data: String,
    /// Public key of the authenticating party
    pub public_key: String,
    /// DID of the authenticating user
    pub did: String,
    /// Application id of the authenticator
    pub app_id: String,
    /// Identity assurance level
    pub ial: Option<String>,
    /// Event data
    pub event_data: Option<Value>,
}

impl AuthenticationRequest {
    /// Request with the mandatory fields.
    pub fn new(
        data: impl Into<String>,
        public_key: impl Into<String>,
        did: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            public_key: public_key.into(),
            did: did.into(),
            app_id: app_id.into(),
            ial: None,
            event_data: None,
        }
    }

    /// Set the identity assurance level.
    #[must_use]
    pub fn with_ial(mut self, ial: impl Into<String>) -> Self {
        self.ial = Some(ial.into());
        self
    }

    /// Attach event data.
    #[must_use]
    pub fn with_event_data(mut self, event_data: Value) -> Self {
        self.event_data = Some(event_data);
        self
    }

    /// Wire payload. Optional fields are inserted only when set; an absent
    /// field is omitted, never encoded as `null`.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("data".to_string(), Value::String(self.data.clone()));
        payload.insert("publicKey".to_string(), Value::String(self.public_key.clone()));
        payload.insert("did".to_string(), Value::String(self.did.clone()));
        payload.insert("appid".to_string(), Value::String(self.app_id.clone()));

        if let Some(ial) = &self.ial {
            payload.insert("ial".to_string(), Value::String(ial.clone()));
        }
        if let Some(event_data) = &self.event_data {
            payload.insert("eventData".to_string(), event_data.clone());
        }

        payload
    }
}

/// Client for the sessions service.
///
/// Owns its [`PublicKeyCache`]; collaborators are injected.
pub struct SessionClient<E: Environment> {
    env: E,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn TenantResolver>,
    profiles: Arc<dyn ProfileLookup>,
    key_cache: PublicKeyCache<E>,
}

impl<E: Environment> SessionClient<E> {
    /// Create a client that fetches service keys over `transport`.
    pub fn new(
        env: E,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn TenantResolver>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        let fetcher =
            Arc::new(ServiceKeyFetcher::new(Arc::clone(&transport), config.request_timeout));
        Self::with_key_fetcher(env, config, transport, resolver, profiles, fetcher)
    }

    /// Create a client with a custom service key fetcher.
    pub fn with_key_fetcher(
        env: E,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn TenantResolver>,
        profiles: Arc<dyn ProfileLookup>,
        fetcher: Arc<dyn PublicKeyFetcher>,
    ) -> Self {
        let key_cache = PublicKeyCache::new(env.clone(), fetcher, config.key_cache_ttl)
            .with_fetch_timeout(config.request_timeout);
        Self { env, config, transport, resolver, profiles, key_cache }
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The client's public key cache.
    pub fn key_cache(&self) -> &PublicKeyCache<E> {
        &self.key_cache
    }

    /// Resolve the tenant context for one call.
    pub async fn resolve_tenant(&self, tenant: &TenantInfo) -> Result<TenantContext, SessionError> {
        Ok(resolve_context(self.resolver.as_ref(), tenant).await?)
    }

    /// Create a session.
    ///
    /// `scopes` defaults to `""` and `auth_type` to `"none"`. Any status but
    /// 201 is returned as a soft failure.
    pub async fn create_session(
        &self,
        ctx: &TenantContext,
        auth_type: Option<&str>,
        scopes: Option<&str>,
        metadata: Option<&Value>,
    ) -> Result<Outcome<Session>, SessionError> {
        let shared_key = self.session_shared_key(ctx).await?;

        let origin = SessionOrigin {
            tag: ctx.community.tenant_tag.clone(),
            url: ctx.services.admin_console_url.clone(),
            community_name: ctx.community.community_name.clone(),
            community_id: ctx.community.community_id.clone(),
            auth_page: self.config.auth_page.clone(),
        };
        let scopes = scopes.unwrap_or("");
        let auth_type = auth_type.unwrap_or("none");
        let payload = NewSessionPayload { origin: &origin, scopes, authtype: auth_type, metadata };

        let public_key = ctx.key_pair.public_key_base64();
        let envelope = EnvelopeBuilder::new(&shared_key, &public_key, &self.config.app_id)
            .license_key(ctx.license_key())
            .build(&self.env, &payload)?;

        let url = format!("{}/session/new", ctx.services.sessions_url);
        let response = self.dispatch(Method::Put, url, envelope).await?;

        if response.status != 201 {
            tracing::warn!("session creation rejected with status {}", response.status);
            return Ok(Outcome::Rejected(SoftFailure::from_response(response)));
        }

        let mut fields = parse_object(&response.body)?;
        let session_id = match take_string(&mut fields, "sessionId")? {
            Some(id) => id,
            None => take_string(&mut fields, "id")?.ok_or_else(|| SessionError::MalformedResponse {
                reason: "creation response has no session id".to_string(),
            })?,
        };

        tracing::info!("created session {}", session_id);

        Ok(Outcome::Completed(Session {
            session_id,
            origin,
            scopes: scopes.to_string(),
            auth_type: auth_type.to_string(),
            state: SessionState::Created,
            url: ctx.services.sessions_url.clone(),
            fields,
        }))
    }

    /// Read the current response of a session.
    ///
    /// An encrypted `data` field is decrypted with a key derived from the
    /// response's own `publicKey`. A decrypt failure fails the whole call.
    pub async fn poll_session(
        &self,
        ctx: &TenantContext,
        session_id: &str,
        options: PollOptions,
    ) -> Result<Outcome<SessionSnapshot>, SessionError> {
        let shared_key = self.session_shared_key(ctx).await?;

        let public_key = ctx.key_pair.public_key_base64();
        let envelope = EnvelopeBuilder::new(&shared_key, &public_key, &self.config.app_id)
            .license_key(ctx.license_key())
            .build_empty(&self.env)?;

        let url = format!("{}/session/{}/response", ctx.services.sessions_url, session_id);
        let response = self.dispatch(Method::Get, url, envelope).await?;

        if response.status != 200 {
            tracing::debug!("poll of session {} returned status {}", session_id, response.status);
            return Ok(Outcome::Rejected(SoftFailure::from_response(response)));
        }

        let mut snapshot = self.decrypt_snapshot(ctx, response)?;

        if options.fetch_profile {
            if let Some(did) = snapshot.did() {
                let did = did.to_string();
                snapshot.account_data =
                    self.profiles.fetch_by_did(&ctx.tenant, &did, options.fetch_devices).await?;
            }
        }

        Ok(Outcome::Completed(snapshot))
    }

    /// Post an authentication response to a session.
    pub async fn authenticate_session(
        &self,
        ctx: &TenantContext,
        session_id: &str,
        request: &AuthenticationRequest,
    ) -> Result<Outcome<SessionSnapshot>, SessionError> {
        let shared_key = self.session_shared_key(ctx).await?;

        let public_key = ctx.key_pair.public_key_base64();
        let envelope = EnvelopeBuilder::new(&shared_key, &public_key, &self.config.app_id)
            .build(&self.env, &request.to_payload())?;

        let url = format!("{}/session/{}/authenticate", ctx.services.sessions_url, session_id);
        let response = self.dispatch(Method::Post, url, envelope).await?;

        if response.status != 200 {
            tracing::warn!(
                "authentication of session {} rejected with status {}",
                session_id,
                response.status
            );
            return Ok(Outcome::Rejected(SoftFailure::from_response(response)));
        }

        Ok(Outcome::Completed(plain_snapshot(response)?))
    }

    /// Read public session info. Unauthenticated; nothing is decrypted.
    pub async fn fetch_session_info(
        &self,
        ctx: &TenantContext,
        session_id: &str,
    ) -> Result<Outcome<SessionSnapshot>, SessionError> {
        let url = format!("{}/session/{}", ctx.services.sessions_url, session_id);
        let envelope = Envelope { headers: Headers::json(), body: None };
        let response = self.dispatch(Method::Get, url, envelope).await?;

        if response.status != 200 {
            return Ok(Outcome::Rejected(SoftFailure::from_response(response)));
        }

        Ok(Outcome::Completed(plain_snapshot(response)?))
    }

    pub(crate) fn env(&self) -> &E {
        &self.env
    }

    pub(crate) async fn dispatch(
        &self,
        method: Method,
        url: String,
        envelope: Envelope,
    ) -> Result<HttpResponse, SessionError> {
        let request = HttpRequest {
            method,
            url,
            headers: envelope.headers,
            body: envelope.body,
            timeout: self.config.request_timeout,
        };
        Ok(send_with_timeout(self.transport.as_ref(), request).await?)
    }

    async fn session_shared_key(&self, ctx: &TenantContext) -> Result<SharedKey, SessionError> {
        let service_key = self.key_cache.get(&ctx.services.session_keys_url()).await?;
        Ok(derive_shared_key_from_base64(ctx.key_pair.secret(), &service_key)?)
    }

    fn decrypt_snapshot(
        &self,
        ctx: &TenantContext,
        response: HttpResponse,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut fields = parse_object(&response.body)?;
        let public_key = take_string(&mut fields, "publicKey")?;
        let data = take_string(&mut fields, "data")?.filter(|d| !d.is_empty());

        let user_data = match (data, &public_key) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(SessionError::MalformedResponse {
                    reason: "encrypted data without a counterpart publicKey".to_string(),
                });
            },
            (Some(ciphertext), Some(counterpart)) => {
                // The counterpart key is server-supplied, so a bad one is a bad response
                let key = derive_shared_key_from_base64(ctx.key_pair.secret(), counterpart)
                    .map_err(|e| SessionError::MalformedResponse {
                        reason: format!("counterpart publicKey: {e}"),
                    })?;
                let user_data = open_json::<UserData>(&ciphertext, &key).inspect_err(|e| {
                    tracing::warn!("rejecting session response: {}", e);
                })?;
                Some(user_data)
            },
        };

        Ok(SessionSnapshot {
            status: response.status,
            public_key,
            user_data,
            account_data: None,
            fields,
        })
    }
}

fn plain_snapshot(response: HttpResponse) -> Result<SessionSnapshot, SessionError> {
    let mut fields = parse_object(&response.body)?;
    let public_key = take_string(&mut fields, "publicKey")?;

    Ok(SessionSnapshot {
        status: response.status,
        public_key,
        user_data: None,
        account_data: None,
        fields,
    })
}

pub(crate) fn parse_object(body: &str) -> Result<Map<String, Value>, SessionError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(SessionError::MalformedResponse {
            reason: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Err(SessionError::MalformedResponse { reason: e.to_string() }),
    }
}

// Absent and null are both `None`; any other non-string is malformed
fn take_string(
    fields: &mut Map<String, Value>,
    name: &str,
) -> Result<Option<String>, SessionError> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(SessionError::MalformedResponse {
            reason: format!("field {name} must be a string, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_omits_absent_optional_fields() {
        let request = AuthenticationRequest::new("blob", "pk", "did:example:1", "app");

        let payload = request.to_payload();

        assert!(!payload.contains_key("ial"));
        assert!(!payload.contains_key("eventData"));
        assert_eq!(payload.len(), 4);
    }

    #[test]
    fn payload_includes_present_optional_fields() {
        let request = AuthenticationRequest::new("blob", "pk", "did:example:1", "app")
            .with_ial("2")
            .with_event_data(json!({ "ip": "10.0.0.1" }));

        let payload = Value::Object(request.to_payload());

        assert_eq!(
            payload,
            json!({
                "data": "blob",
                "publicKey": "pk",
                "did": "did:example:1",
                "appid": "app",
                "ial": "2",
                "eventData": { "ip": "10.0.0.1" }
            })
        );
    }

    #[test]
    fn new_session_payload_omits_missing_metadata() {
        let origin = SessionOrigin {
            tag: "acme".to_string(),
            url: "https://admin.example".to_string(),
            community_name: "default".to_string(),
            community_id: "c-1".to_string(),
            auth_page: "blockid://authenticate".to_string(),
        };
        let payload =
            NewSessionPayload { origin: &origin, scopes: "", authtype: "none", metadata: None };

        let value = serde_json::to_value(&payload).unwrap();

        assert!(value.get("metadata").is_none());
        assert_eq!(value["origin"]["communityName"], "default");
        assert_eq!(value["origin"]["authPage"], "blockid://authenticate");
    }

    #[test]
    fn soft_failure_state_splits_on_server_errors() {
        let rejected = SoftFailure { status: 409, message: "conflict".to_string() };
        let errored = SoftFailure { status: 503, message: "unavailable".to_string() };

        assert_eq!(rejected.state(), SessionState::Rejected);
        assert_eq!(errored.state(), SessionState::Errored);
    }

    #[test]
    fn outcome_helpers() {
        let done: Outcome<u8> = Outcome::Completed(7);
        let failed: Outcome<u8> =
            Outcome::Rejected(SoftFailure { status: 404, message: String::new() });

        assert!(done.is_completed());
        assert_eq!(done.clone().map(|v| v + 1).completed(), Some(8));
        assert_eq!(failed.rejection().map(|f| f.status), Some(404));
        assert!(failed.into_result().is_err());
    }

    #[test]
    fn take_string_treats_null_as_absent() {
        let mut fields = parse_object(r#"{"publicKey":null,"data":"x","n":1}"#).unwrap();

        assert_eq!(take_string(&mut fields, "publicKey").unwrap(), None);
        assert_eq!(take_string(&mut fields, "data").unwrap(), Some("x".to_string()));
        assert!(take_string(&mut fields, "n").is_err());
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object("[1,2]").is_err());
        assert!(parse_object("not json").is_err());
    }

    #[test]
    fn snapshot_state_follows_user_data() {
        let mut snapshot = SessionSnapshot {
            status: 200,
            public_key: None,
            user_data: None,
            account_data: None,
            fields: Map::new(),
        };
        assert_eq!(snapshot.state(), SessionState::AwaitingResponse);

        snapshot.user_data =
            Some(UserData { did: Some("did:example:1".to_string()), fields: Map::new() });
        assert_eq!(snapshot.state(), SessionState::Authenticated);
        assert_eq!(snapshot.did(), Some("did:example:1"));
    }
}
