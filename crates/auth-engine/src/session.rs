//! Console session: login, logout, refresh and the derived session view.
//!
//! Whether a session exists is always derived from storage (access token and
//! identity both present). The FSM adds the in-progress states and is
//! reconciled with storage whenever it is observed, because the pipeline
//! may tear the session down on its own (refresh failure, 403).

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState};
use crate::guard::{check_route, GuardDecision, RouteMeta, Routes};
use crate::hooks::UiHooks;
use crate::pipeline::{ApiRequest, RequestPipeline};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::{ApiError, AuthError, AuthResult};
use console_config_and_utils::Config;
use parking_lot::Mutex;
use secure_scoped_storage::{CredentialManager, UserIdentity, WriteOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";
const CURRENT_USER_PATH: &str = "/auth/me";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    otp_code: Option<&'a str>,
}

/// Login response payload.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    user: Option<UserIdentity>,
    #[serde(default)]
    require_otp: bool,
}

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthState) + Send + Sync>;

/// Session facade used by the console.
pub struct ConsoleSession {
    credentials: Arc<CredentialManager>,
    pipeline: RequestPipeline,
    routes: Routes,
    fsm: Mutex<AuthMachine>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

impl ConsoleSession {
    /// Create a session over stored credentials.
    pub fn new(
        credentials: Arc<CredentialManager>,
        transport: Arc<dyn HttpTransport>,
        hooks: Arc<dyn UiHooks>,
        routes: Routes,
    ) -> Self {
        let pipeline = RequestPipeline::new(
            transport,
            Arc::clone(&credentials),
            hooks,
            routes.login.clone(),
        );

        let session = Self {
            credentials,
            pipeline,
            routes,
            fsm: Mutex::new(AuthMachine::new()),
            state_callback: Mutex::new(None),
        };
        session.reconcile();
        session
    }

    /// Create a session talking to the backend named in `config`.
    pub fn from_config(
        config: &Config,
        credentials: Arc<CredentialManager>,
        hooks: Arc<dyn UiHooks>,
    ) -> AuthResult<Self> {
        let transport = ReqwestTransport::new(config.api_base_url()?, config.request_timeout())?;
        Ok(Self::new(
            credentials,
            Arc::new(transport),
            hooks,
            Routes::from_config(config),
        ))
    }

    /// Pipeline for API calls made on behalf of this session.
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Set a callback to be notified of auth state changes.
    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    // ==========================================
    // Session view
    // ==========================================

    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_logged_in()
    }

    pub fn current_identity(&self) -> Option<UserIdentity> {
        self.credentials.identity()
    }

    /// Current state, after syncing the FSM with storage.
    pub fn auth_state(&self) -> AuthState {
        self.reconcile()
    }

    /// Check whether `route` may be entered now.
    pub fn guard(&self, route: &RouteMeta) -> GuardDecision {
        let decision = check_route(&self.routes, route, &self.credentials.session_snapshot());
        if let GuardDecision::Redirect(target) = &decision {
            debug!(route = %route.path, target = %target, "Route entry redirected");
        }
        decision
    }

    // ==========================================
    // Operations
    // ==========================================

    /// Log in and cache tokens and identity.
    ///
    /// Uses the FSM to track the login operation:
    /// - NotLoggedIn -> LoggingIn -> (LoggedIn | NotLoggedIn)
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        otp_code: Option<&str>,
    ) -> AuthResult<UserIdentity> {
        self.reconcile();
        self.transition(&AuthMachineInput::LoginAttempt)?;

        match self.try_login(username, password, otp_code).await {
            Ok(identity) => {
                self.transition(&AuthMachineInput::LoginSuccess)?;
                info!(user_id = %identity.id, username = %identity.username, "Login successful");
                Ok(identity)
            }
            Err(e) => {
                warn!(username, error = %e, "Login failed");
                self.transition(&AuthMachineInput::LoginFailed)?;
                Err(e)
            }
        }
    }

    async fn try_login(
        &self,
        username: &str,
        password: &str,
        otp_code: Option<&str>,
    ) -> AuthResult<UserIdentity> {
        let request = ApiRequest::post(LOGIN_PATH)
            .with_body(&LoginRequest {
                username,
                password,
                otp_code,
            })?
            .skip_refresh();

        let response: LoginResponse = match self.pipeline.request(request).await {
            Ok(response) => response,
            Err(ApiError::Unauthorized) => {
                return Err(AuthError::InvalidCredentials(
                    "username or password is incorrect".to_string(),
                ))
            }
            Err(ApiError::Business { code, message }) if code == 400 || code == 401 => {
                return Err(AuthError::InvalidCredentials(message))
            }
            Err(e) => return Err(e.into()),
        };

        if response.access_token.is_empty() {
            if response.require_otp {
                return Err(AuthError::OtpRequired);
            }
            return Err(ApiError::Decode("login response carries no access token".to_string()).into());
        }

        if self
            .credentials
            .set_tokens(&response.access_token, &response.refresh_token)
            == WriteOutcome::Dropped
        {
            self.credentials.clear_tokens();
            return Err(AuthError::SessionNotPersisted("tokens".to_string()));
        }

        let identity = response.user.unwrap_or_default();
        if self.credentials.set_identity(&identity) == WriteOutcome::Dropped {
            self.credentials.destroy_session();
            return Err(AuthError::SessionNotPersisted("identity".to_string()));
        }

        // The login payload may be partial; prefer the backend's current view.
        match self.fetch_current_user().await {
            Ok(current) => Ok(current),
            Err(e) => {
                warn!(error = %e, "Failed to get current user after login, keeping login identity");
                Ok(identity)
            }
        }
    }

    /// Log out: best-effort backend notification, then local teardown.
    ///
    /// - LoggedIn -> LoggingOut -> NotLoggedIn
    pub async fn logout(&self) -> AuthResult<()> {
        self.reconcile();
        let _ = self.transition(&AuthMachineInput::LogoutRequested);

        if self.credentials.access_token().is_some() {
            let request = ApiRequest::post(LOGOUT_PATH).skip_refresh();
            if let Err(e) = self.pipeline.execute(request).await {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }

        self.credentials.destroy_session();
        let _ = self.transition(&AuthMachineInput::LogoutComplete);

        info!("Logged out");
        Ok(())
    }

    /// Refresh the token pair through the shared refresh coordinator.
    ///
    /// - LoggedIn -> Refreshing -> (LoggedIn | NotLoggedIn)
    pub async fn refresh(&self) -> AuthResult<()> {
        if self.credentials.refresh_token().is_none() {
            return Err(AuthError::NotLoggedIn);
        }

        self.reconcile();
        let _ = self.transition(&AuthMachineInput::TokenExpired);

        match self.pipeline.refresh().await {
            Ok(_) => {
                let _ = self.transition(&AuthMachineInput::RefreshSuccess);
                Ok(())
            }
            Err(e) => {
                let _ = self.transition(&AuthMachineInput::RefreshFailed);
                Err(e.into())
            }
        }
    }

    /// Fetch the current user from the backend and cache it.
    pub async fn fetch_current_user(&self) -> AuthResult<UserIdentity> {
        let identity: UserIdentity = self.pipeline.get(CURRENT_USER_PATH).await?;
        if self.credentials.set_identity(&identity) == WriteOutcome::Dropped {
            warn!("Current user could not be cached");
        }
        Ok(identity)
    }

    // ==========================================
    // FSM
    // ==========================================

    /// Transition the FSM and notify callback if state changed.
    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            self.notify_state_change(new_state);
        }

        Ok(new_state)
    }

    /// Bring a settled FSM state in line with stored credentials.
    fn reconcile(&self) -> AuthState {
        let current = AuthState::from(self.fsm.lock().state());
        let logged_in = self.credentials.is_logged_in();

        let input = match current {
            AuthState::NotLoggedIn if logged_in => AuthMachineInput::SessionRestored,
            AuthState::LoggedIn if !logged_in => AuthMachineInput::SessionLost,
            state => return state,
        };

        self.transition(&input).unwrap_or(current)
    }

    fn notify_state_change(&self, state: AuthState) {
        if let Some(callback) = self.state_callback.lock().as_ref() {
            callback(state);
        }
    }
}
