#![allow(dead_code)]

use async_trait::async_trait;
use auth_engine::{
    ApiError, ApiResult, ConsoleSession, HttpTransport, Notice, OutboundRequest, RawResponse,
    RequestPipeline, Routes, UiHooks,
};
use parking_lot::Mutex;
use secure_scoped_storage::{
    CredentialManager, EncryptedScopedStore, MemoryBackend, ScopeBackend, StorageCipher,
    StorageError, StorageResult, UserIdentity,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub const OLD_ACCESS: &str = "access-old";
pub const OLD_REFRESH: &str = "refresh-old";
pub const NEW_ACCESS: &str = "access-new";
pub const NEW_REFRESH: &str = "refresh-new";

/// One request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub trade_id: Option<String>,
    pub body: Option<Value>,
    /// Access token in storage at the moment the request arrived.
    pub stored_access: Option<String>,
}

#[derive(Default)]
struct BackendState {
    valid_token: String,
    refresh_ok: bool,
    refresh_delay: Duration,
    refresh_calls: usize,
    offline: bool,
    status_overrides: HashMap<String, (u16, Value)>,
    login_response: Option<Value>,
    me_response: Option<Value>,
    rotate_on_unauthorized: bool,
    requests: Vec<Recorded>,
}

/// In-process stand-in for the backend.
///
/// Requests carrying the currently valid access token succeed; anything
/// else gets a 401. `/auth/refresh` issues [`NEW_ACCESS`]/[`NEW_REFRESH`].
pub struct FakeBackend {
    state: Mutex<BackendState>,
    credentials: Mutex<Option<Arc<CredentialManager>>>,
}

impl FakeBackend {
    pub fn new(valid_token: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                valid_token: valid_token.to_string(),
                refresh_ok: true,
                refresh_delay: Duration::from_millis(100),
                ..Default::default()
            }),
            credentials: Mutex::new(None),
        })
    }

    pub fn attach(&self, credentials: Arc<CredentialManager>) {
        *self.credentials.lock() = Some(credentials);
    }

    pub fn set_refresh_ok(&self, ok: bool) {
        self.state.lock().refresh_ok = ok;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().refresh_delay = delay;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn override_status(&self, path: &str, status: u16, body: Value) {
        self.state
            .lock()
            .status_overrides
            .insert(path.to_string(), (status, body));
    }

    pub fn set_login_response(&self, data: Value) {
        self.state.lock().login_response = Some(data);
    }

    pub fn set_me_response(&self, data: Value) {
        self.state.lock().me_response = Some(data);
    }

    /// On the next stale-token request, rotate the stored tokens to the new
    /// pair before answering 401, as if another caller had just refreshed.
    pub fn rotate_on_unauthorized(&self) {
        self.state.lock().rotate_on_unauthorized = true;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().refresh_calls
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn stored_access(&self) -> Option<String> {
        self.credentials
            .lock()
            .as_ref()
            .and_then(|credentials| credentials.access_token())
    }
}

fn envelope(data: Value) -> RawResponse {
    RawResponse::json(200, &json!({ "code": 200, "message": "success", "data": data }))
}

fn error_body(status: u16, message: &str) -> RawResponse {
    RawResponse::json(status, &json!({ "code": status, "message": message }))
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: OutboundRequest) -> ApiResult<RawResponse> {
        let recorded = Recorded {
            method: request.method.as_str().to_string(),
            path: request.path.clone(),
            bearer: request.bearer_token().map(str::to_string),
            trade_id: request.header("X-Trade-ID").map(str::to_string),
            body: request.body.clone(),
            stored_access: self.stored_access(),
        };

        let (offline, refresh_delay) = {
            let mut state = self.state.lock();
            state.requests.push(recorded.clone());
            (state.offline, state.refresh_delay)
        };

        if offline {
            return Err(ApiError::Network("connection refused".to_string()));
        }

        if let Some((status, body)) = self.state.lock().status_overrides.get(&request.path) {
            return Ok(RawResponse::json(*status, body));
        }

        match request.path.as_str() {
            "/auth/refresh" => {
                self.state.lock().refresh_calls += 1;
                tokio::time::sleep(refresh_delay).await;

                let mut state = self.state.lock();
                if state.refresh_ok {
                    state.valid_token = NEW_ACCESS.to_string();
                    Ok(envelope(json!({
                        "access_token": NEW_ACCESS,
                        "refresh_token": NEW_REFRESH,
                        "token_type": "Bearer",
                        "expires_in": 3600
                    })))
                } else {
                    Ok(error_body(401, "refresh token expired"))
                }
            }
            "/auth/login" => {
                let state = self.state.lock();
                match &state.login_response {
                    Some(data) => Ok(envelope(data.clone())),
                    None => Ok(error_body(401, "invalid username or password")),
                }
            }
            "/auth/logout" => Ok(envelope(Value::Null)),
            path => {
                let (authorized, rotate) = {
                    let mut state = self.state.lock();
                    let authorized = recorded.bearer.as_deref() == Some(state.valid_token.as_str());
                    let rotate = !authorized && state.rotate_on_unauthorized;
                    if rotate {
                        state.rotate_on_unauthorized = false;
                        state.valid_token = NEW_ACCESS.to_string();
                    }
                    (authorized, rotate)
                };

                if rotate {
                    if let Some(credentials) = self.credentials.lock().as_ref() {
                        let _ = credentials.set_tokens(NEW_ACCESS, NEW_REFRESH);
                    }
                }

                if !authorized {
                    return Ok(error_body(401, "token expired"));
                }

                if path == "/auth/me" {
                    let me = self.state.lock().me_response.clone();
                    return Ok(envelope(me.unwrap_or_else(|| json!({ "id": "u-1", "username": "alice" }))));
                }

                Ok(envelope(json!({ "path": path, "token": recorded.bearer })))
            }
        }
    }
}

/// Hooks that remember everything the pipeline asked of the UI.
#[derive(Default)]
pub struct RecordingHooks {
    notices: Mutex<Vec<Notice>>,
    navigations: Mutex<Vec<String>>,
    route: Mutex<Option<String>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_route(&self, route: &str) {
        *self.route.lock() = Some(route.to_string());
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }
}

impl UiHooks for RecordingHooks {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }

    fn current_route(&self) -> Option<String> {
        self.route.lock().clone()
    }

    fn navigate(&self, route: &str) {
        self.navigations.lock().push(route.to_string());
        *self.route.lock() = Some(route.to_string());
    }
}

pub fn memory_credentials() -> Arc<CredentialManager> {
    Arc::new(CredentialManager::new(EncryptedScopedStore::new(
        Box::new(MemoryBackend::new()),
        Box::new(MemoryBackend::new()),
        StorageCipher::from_secret("integration-secret").unwrap(),
    )))
}

pub fn alice() -> UserIdentity {
    serde_json::from_value(json!({
        "id": "u-1",
        "username": "alice",
        "email": "alice@example.com",
        "display_name": "Alice",
        "roles": ["user"]
    }))
    .unwrap()
}

/// Credentials holding the old token pair and an identity.
pub fn logged_in_credentials() -> Arc<CredentialManager> {
    let credentials = memory_credentials();
    assert!(credentials.set_tokens(OLD_ACCESS, OLD_REFRESH).is_stored());
    assert!(credentials.set_identity(&alice()).is_stored());
    credentials
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub hooks: Arc<RecordingHooks>,
    pub credentials: Arc<CredentialManager>,
    pub pipeline: Arc<RequestPipeline>,
}

/// Pipeline over a logged-in session whose access token the backend no
/// longer accepts.
pub fn expired_session_harness() -> Harness {
    let backend = FakeBackend::new(NEW_ACCESS);
    let hooks = RecordingHooks::new();
    hooks.set_route("/console/users");
    let credentials = logged_in_credentials();
    backend.attach(Arc::clone(&credentials));

    let pipeline = Arc::new(RequestPipeline::new(
        backend.clone(),
        Arc::clone(&credentials),
        hooks.clone(),
        "/login",
    ));

    Harness {
        backend,
        hooks,
        credentials,
        pipeline,
    }
}

/// Shared view into a [`WatchedDurable`] backend.
#[derive(Default)]
pub struct DurableWatch {
    fail_writes: AtomicBool,
    pipeline: Mutex<Option<Weak<RequestPipeline>>>,
    reads: Mutex<Vec<(String, bool)>>,
    deletes: Mutex<Vec<(String, bool)>>,
}

impl DurableWatch {
    /// Make every durable write fail as if the disk were full.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Whether a refresh was in flight at each read of `key`.
    pub fn refreshing_at_reads(&self, key: &str) -> Vec<bool> {
        Self::filter(&self.reads, key)
    }

    /// Whether a refresh was in flight at each delete of `key`.
    pub fn refreshing_at_deletes(&self, key: &str) -> Vec<bool> {
        Self::filter(&self.deletes, key)
    }

    fn filter(log: &Mutex<Vec<(String, bool)>>, key: &str) -> Vec<bool> {
        log.lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, refreshing)| *refreshing)
            .collect()
    }

    fn is_refreshing(&self) -> bool {
        let pipeline = self.pipeline.lock().as_ref().and_then(Weak::upgrade);
        pipeline.map(|p| p.is_refreshing()).unwrap_or(false)
    }
}

/// Durable backend that notes the pipeline's refresh state on every read
/// and delete.
pub struct WatchedDurable {
    inner: MemoryBackend,
    watch: Arc<DurableWatch>,
}

impl ScopeBackend for WatchedDurable {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if self.watch.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded {
                needed: value.len(),
                quota: 0,
            });
        }
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let refreshing = self.watch.is_refreshing();
        self.watch.reads.lock().push((key.to_string(), refreshing));
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let refreshing = self.watch.is_refreshing();
        self.watch.deletes.lock().push((key.to_string(), refreshing));
        self.inner.delete(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys()
    }
}

/// Like [`expired_session_harness`], with the durable scope behind a
/// [`WatchedDurable`].
pub fn watched_session_harness() -> (Harness, Arc<DurableWatch>) {
    let watch = Arc::new(DurableWatch::default());
    let credentials = Arc::new(CredentialManager::new(EncryptedScopedStore::new(
        Box::new(MemoryBackend::new()),
        Box::new(WatchedDurable {
            inner: MemoryBackend::new(),
            watch: Arc::clone(&watch),
        }),
        StorageCipher::from_secret("integration-secret").unwrap(),
    )));
    assert!(credentials.set_tokens(OLD_ACCESS, OLD_REFRESH).is_stored());
    assert!(credentials.set_identity(&alice()).is_stored());

    let backend = FakeBackend::new(NEW_ACCESS);
    let hooks = RecordingHooks::new();
    hooks.set_route("/console/users");
    backend.attach(Arc::clone(&credentials));

    let pipeline = Arc::new(RequestPipeline::new(
        backend.clone(),
        Arc::clone(&credentials),
        hooks.clone(),
        "/login",
    ));
    *watch.pipeline.lock() = Some(Arc::downgrade(&pipeline));

    let harness = Harness {
        backend,
        hooks,
        credentials,
        pipeline,
    };
    (harness, watch)
}

/// Console session over empty storage.
pub fn session_harness() -> (Arc<FakeBackend>, Arc<RecordingHooks>, ConsoleSession) {
    let backend = FakeBackend::new(NEW_ACCESS);
    let hooks = RecordingHooks::new();
    let credentials = memory_credentials();
    backend.attach(Arc::clone(&credentials));

    let session = ConsoleSession::new(
        credentials,
        backend.clone(),
        hooks.clone(),
        Routes::default(),
    );
    (backend, hooks, session)
}
