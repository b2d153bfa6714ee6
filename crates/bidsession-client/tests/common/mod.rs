//! Shared fixtures: an in-memory identity service, a static tenant resolver,
//! and a manually driven environment.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bidsession_client::{
    AccountData, ClientConfig, CommunityInfo, Environment, HttpRequest, HttpResponse, Method,
    ProfileLookup, ProfileLookupError, ServiceDirectory, SessionClient, TenantContext, TenantInfo,
    TenantResolutionError, TenantResolver, Transport, TransportError,
};
use bidsession_crypto::{KeyPair, SharedKey, derive_shared_key, encrypt_to_base64};
use serde_json::{Value, json};

pub const SESSIONS_URL: &str = "https://sessions.example/api/r2";
pub const ADMIN_URL: &str = "https://admin.example";
pub const LICENSE_KEY: &str = "lk-0123456789";

pub fn client_keys() -> KeyPair {
    KeyPair::from_secret_bytes(&[0x11; 32]).unwrap()
}

pub fn service_keys() -> KeyPair {
    KeyPair::from_secret_bytes(&[0x22; 32]).unwrap()
}

pub fn community_keys() -> KeyPair {
    KeyPair::from_secret_bytes(&[0x33; 32]).unwrap()
}

/// Key pair of the device answering a session.
pub fn authenticator_keys() -> KeyPair {
    KeyPair::from_secret_bytes(&[0x44; 32]).unwrap()
}

pub fn sessions_url(path: &str) -> String {
    format!("{SESSIONS_URL}{path}")
}

/// Manual clock, counter-derived randomness.
///
/// Every draw mixes a fresh 64-bit counter into the buffer, so any buffer of
/// eight bytes or more (nonces, uuids) is unique per draw.
#[derive(Clone)]
pub struct TestEnv {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
    draws: Arc<AtomicU64>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
            draws: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn wall_clock_secs(&self) -> u64 {
        1_700_000_000 + self.offset_ms.load(Ordering::SeqCst) / 1000
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let draw = self.draws.fetch_add(1, Ordering::SeqCst).to_le_bytes();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = draw[i % 8] ^ (i / 8) as u8;
        }
    }
}

/// In-memory identity service.
///
/// Serves its public key at `<sessions>/publickeys` unless a response is
/// scripted for it. Unscripted routes answer 404.
pub struct FakeService {
    pub keys: KeyPair,
    responses: Mutex<HashMap<(Method, String), HttpResponse>>,
    stalled: Mutex<HashSet<(Method, String)>>,
    requests: Mutex<Vec<HttpRequest>>,
    key_fetches: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            keys: service_keys(),
            responses: Mutex::new(HashMap::new()),
            stalled: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
            key_fetches: AtomicUsize::new(0),
        })
    }

    pub fn respond(
        &self,
        method: Method,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) {
        let response = HttpResponse::new(status, body);
        self.responses.lock().unwrap().insert((method, url.into()), response);
    }

    /// Never answer this route.
    pub fn stall(&self, method: Method, url: impl Into<String>) {
        self.stalled.lock().unwrap().insert((method, url.into()));
    }

    pub fn key_fetches(&self) -> usize {
        self.key_fetches.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self, method: Method, url: &str) -> Option<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.url == url)
            .cloned()
    }

    /// Key the service side derives for a request from `client`.
    pub fn shared_key_with(&self, client: &KeyPair) -> SharedKey {
        derive_shared_key(self.keys.secret(), client.public())
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let route = (request.method, request.url.clone());
        self.requests.lock().unwrap().push(request);

        let keys_url = sessions_url("/publickeys");
        if route.1 == keys_url {
            self.key_fetches.fetch_add(1, Ordering::SeqCst);
        }

        if self.stalled.lock().unwrap().contains(&route) {
            return std::future::pending().await;
        }

        if let Some(response) = self.responses.lock().unwrap().get(&route) {
            return Ok(response.clone());
        }

        if route == (Method::Get, keys_url) {
            let body = json!({ "publicKey": self.keys.public_key_base64() });
            return Ok(HttpResponse::new(200, body.to_string()));
        }

        Ok(HttpResponse::new(404, "not found"))
    }
}

/// Resolver over fixed tenant data.
pub struct StaticResolver {
    pub keys: Arc<KeyPair>,
    pub community: CommunityInfo,
    pub services: ServiceDirectory,
    pub unknown_tenant: bool,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(client_keys()),
            community: CommunityInfo {
                community_id: "5f3d8d0cd866fa61019cf968".to_string(),
                community_name: "default".to_string(),
                community_public_key: community_keys().public_key_base64(),
                tenant_tag: "acme".to_string(),
            },
            services: ServiceDirectory {
                admin_console_url: ADMIN_URL.to_string(),
                sessions_url: SESSIONS_URL.to_string(),
            },
            unknown_tenant: false,
        }
    }
}

#[async_trait]
impl TenantResolver for StaticResolver {
    async fn resolve_community(
        &self,
        tenant: &TenantInfo,
    ) -> Result<CommunityInfo, TenantResolutionError> {
        if self.unknown_tenant {
            return Err(TenantResolutionError::new(format!("unknown tenant {}", tenant.dns)));
        }
        Ok(self.community.clone())
    }

    async fn resolve_service_map(
        &self,
        _tenant: &TenantInfo,
    ) -> Result<ServiceDirectory, TenantResolutionError> {
        Ok(self.services.clone())
    }

    fn local_key_pair(&self) -> Arc<KeyPair> {
        Arc::clone(&self.keys)
    }
}

/// How [`FakeProfiles`] answers a lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfileAnswer {
    #[default]
    Found,
    NotFound,
    Fail,
}

/// Profile lookup with a scripted answer.
#[derive(Default)]
pub struct FakeProfiles {
    calls: AtomicUsize,
    answer: Mutex<ProfileAnswer>,
}

impl FakeProfiles {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn answer_with(&self, answer: ProfileAnswer) {
        *self.answer.lock().unwrap() = answer;
    }
}

#[async_trait]
impl ProfileLookup for FakeProfiles {
    async fn fetch_by_did(
        &self,
        _tenant: &TenantInfo,
        did: &str,
        include_devices: bool,
    ) -> Result<Option<AccountData>, ProfileLookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock().unwrap();
        match answer {
            ProfileAnswer::Found => {
                Ok(Some(AccountData(json!({ "did": did, "withDevices": include_devices }))))
            },
            ProfileAnswer::NotFound => Ok(None),
            ProfileAnswer::Fail => Err(ProfileLookupError::new("directory unavailable")),
        }
    }
}

pub fn tenant() -> TenantInfo {
    TenantInfo {
        dns: "acme.example".to_string(),
        community_name: "default".to_string(),
        license_key: LICENSE_KEY.to_string(),
    }
}

pub struct Harness {
    pub env: TestEnv,
    pub service: Arc<FakeService>,
    pub profiles: Arc<FakeProfiles>,
    pub client: SessionClient<TestEnv>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_resolver(ClientConfig::default(), StaticResolver::new())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self::with_resolver(config, StaticResolver::new())
    }

    pub fn with_resolver(config: ClientConfig, resolver: StaticResolver) -> Self {
        let env = TestEnv::new();
        let service = FakeService::new();
        let profiles = Arc::new(FakeProfiles::default());
        let client = SessionClient::new(
            env.clone(),
            config,
            Arc::clone(&service) as Arc<dyn Transport>,
            Arc::new(resolver),
            Arc::clone(&profiles) as Arc<dyn ProfileLookup>,
        );
        Self { env, service, profiles, client }
    }

    pub async fn context(&self) -> TenantContext {
        self.client.resolve_tenant(&tenant()).await.unwrap()
    }
}

/// Poll response body as posted by the authenticating device.
pub fn sealed_response(user_data: &Value) -> String {
    let device = authenticator_keys();
    let key = derive_shared_key(device.secret(), client_keys().public());
    let data = encrypt_to_base64(user_data.to_string().as_bytes(), &key, [0x5a; 24]).unwrap();

    json!({ "publicKey": device.public_key_base64(), "data": data }).to_string()
}
