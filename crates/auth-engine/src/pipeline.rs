//! Outbound request pipeline.
//!
//! Decorates every request with a trade id and the current bearer token,
//! maps failed responses to notices and errors, unwraps the backend
//! envelope, and recovers 401s through a single shared refresh.

use crate::episode::{RefreshCoordinator, Recovery};
use crate::hooks::{Notice, UiHooks};
use crate::transport::{HttpTransport, OutboundRequest, RawResponse};
use crate::{ApiError, ApiResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Method;
use secure_scoped_storage::CredentialManager;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TRADE_ID_HEADER: &str = "X-Trade-ID";

const REFRESH_PATH: &str = "/auth/refresh";

/// A request as issued by API callers.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Never start a refresh for this request (auth exchanges).
    pub skip_refresh: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            skip_refresh: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        self.body = Some(serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?);
        Ok(self)
    }

    pub fn skip_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }
}

/// Token pair returned by the refresh exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

struct Dispatched {
    response: RawResponse,
    sent_token: Option<String>,
}

/// Generate `console_<unix-ms>_<9 random chars>`.
pub fn generate_trade_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("console_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}

/// Request pipeline shared by everything that talks to the backend.
pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialManager>,
    hooks: Arc<dyn UiHooks>,
    coordinator: RefreshCoordinator,
    login_route: String,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialManager>,
        hooks: Arc<dyn UiHooks>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            hooks,
            coordinator: RefreshCoordinator::new(),
            login_route: login_route.into(),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub fn hooks(&self) -> &Arc<dyn UiHooks> {
        &self.hooks
    }

    pub fn is_refreshing(&self) -> bool {
        self.coordinator.is_refreshing()
    }

    // ==========================================
    // Verbs
    // ==========================================

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(ApiRequest::post(path).with_body(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::PUT, path).with_body(body)?)
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::DELETE, path)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(ApiRequest::new(Method::PATCH, path).with_body(body)?)
            .await
    }

    /// Execute `request` and deserialize the unwrapped payload.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let value = self.execute(request).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Execute `request` and return the unwrapped payload.
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<Value> {
        let first = self.dispatch(&request, None).await?;

        if first.response.status != 401 || request.skip_refresh {
            return self.handle_response(&request, first.response);
        }

        debug!(path = %request.path, "Unauthorized, recovering");
        let token = self.recover(first.sent_token.as_deref()).await?;

        // The replay is marked as retried: a second 401 is final.
        let replay = self.dispatch(&request, Some(token)).await?;
        self.handle_response(&request, replay.response)
    }

    /// Refresh the token pair now, sharing an in-flight refresh if there is one.
    pub async fn refresh(&self) -> ApiResult<String> {
        let current = self.credentials.access_token();
        self.recover(current.as_deref()).await
    }

    // ==========================================
    // Internals
    // ==========================================

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token_override: Option<String>,
    ) -> ApiResult<Dispatched> {
        let sent_token = token_override.or_else(|| self.credentials.access_token());

        let mut headers = BTreeMap::new();
        headers.insert(TRADE_ID_HEADER.to_string(), generate_trade_id());
        if let Some(token) = &sent_token {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        let outbound = OutboundRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            headers,
            body: request.body.clone(),
        };

        match self.transport.send(outbound).await {
            Ok(response) => Ok(Dispatched {
                response,
                sent_token,
            }),
            Err(e) => {
                warn!(path = %request.path, error = %e, "Request failed without response");
                self.hooks.notify(Notice::NetworkError);
                Err(e)
            }
        }
    }

    async fn recover(&self, sent_token: Option<&str>) -> ApiResult<String> {
        let recovery = self.coordinator.begin(&self.credentials, sent_token);
        self.drive(recovery).await
    }

    async fn drive(&self, recovery: Recovery) -> ApiResult<String> {
        match recovery {
            Recovery::Replay(token) => Ok(token),
            Recovery::Wait(rx) => rx.await.unwrap_or(Err(ApiError::Cancelled)),
            Recovery::NoRefreshToken => {
                let snapshot = self.credentials.session_snapshot();
                if snapshot.access_token.is_none() && snapshot.identity.is_none() {
                    debug!("Unauthorized after the session ended");
                } else {
                    warn!("Unauthorized with no refresh token, ending session");
                    self.expire_session();
                }
                Err(ApiError::SessionExpired("no refresh token".to_string()))
            }
            Recovery::Lead {
                episode,
                refresh_token,
            } => self.lead(episode, refresh_token).await,
        }
    }

    async fn lead(&self, id: u64, refresh_token: String) -> ApiResult<String> {
        let guard = self.coordinator.guard(id);

        let refreshed = match self.exchange(&refresh_token).await {
            Ok(pair) => {
                if self
                    .credentials
                    .set_tokens(&pair.access_token, &pair.refresh_token)
                    .is_stored()
                {
                    Ok(pair.access_token)
                } else {
                    Err("refreshed tokens could not be stored".to_string())
                }
            }
            Err(e) => Err(e.to_string()),
        };

        match refreshed {
            Ok(access_token) => {
                let episode = self.coordinator.finish(id);
                guard.disarm();

                let result = Ok(access_token);
                let released = episode.map(|episode| episode.resolve(&result)).unwrap_or(0);
                info!(episode = id, released, "Token refreshed");
                result
            }
            Err(cause) => {
                warn!(episode = id, error = %cause, "Token refresh failed");

                // Torn down before the coordinator goes idle, so a late 401
                // cannot start another episode with the rejected token.
                self.credentials.destroy_session();
                let episode = self.coordinator.finish(id);
                guard.disarm();

                let result = Err(ApiError::SessionExpired(cause));
                if let Some(episode) = episode {
                    episode.resolve(&result);
                }
                self.hooks.notify(Notice::SessionExpired);
                self.redirect_to_login();
                result
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let request = ApiRequest::post(REFRESH_PATH)
            .with_body(&serde_json::json!({ "refresh_token": refresh_token }))?
            .skip_refresh();

        let dispatched = self.dispatch(&request, None).await?;
        let value = self.handle_response(&request, dispatched.response)?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn handle_response(&self, request: &ApiRequest, response: RawResponse) -> ApiResult<Value> {
        let status = response.status;
        if (200..300).contains(&status) {
            return unwrap_envelope(&response.body);
        }

        debug!(path = %request.path, status, "Request failed");
        match status {
            401 => Err(ApiError::Unauthorized),
            403 => {
                self.hooks.notify(Notice::Forbidden);
                self.teardown();
                Err(ApiError::Forbidden)
            }
            404 => {
                self.hooks.notify(Notice::NotFound);
                Err(ApiError::NotFound)
            }
            500 => {
                self.hooks.notify(Notice::ServerError);
                Err(ApiError::Server { status })
            }
            _ => {
                let message = serde_json::from_str::<ErrorBody>(&response.body)
                    .ok()
                    .and_then(|body| body.message)
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| "Request failed".to_string());
                self.hooks.notify(Notice::RequestFailed(message.clone()));
                Err(ApiError::Http { status, message })
            }
        }
    }

    /// Session ended by the backend: tear down, tell the user, go to login.
    fn expire_session(&self) {
        self.hooks.notify(Notice::SessionExpired);
        self.teardown();
    }

    fn teardown(&self) {
        self.credentials.destroy_session();
        self.redirect_to_login();
    }

    fn redirect_to_login(&self) {
        let on_login = self.hooks.current_route().as_deref() == Some(self.login_route.as_str());
        if !on_login {
            self.hooks.navigate(&self.login_route);
        }
    }
}

/// Unwrap `{code, message, data}`.
fn unwrap_envelope(body: &str) -> ApiResult<Value> {
    let raw: Value = serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let envelope: Envelope =
        serde_json::from_value(raw.clone()).map_err(|e| ApiError::Decode(e.to_string()))?;

    match envelope.code {
        200 | 201 if envelope.data.is_null() => Ok(raw),
        200 | 201 => Ok(envelope.data),
        code => Err(ApiError::Business {
            code,
            message: envelope
                .message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| "Request failed".to_string()),
        }),
    }
}
