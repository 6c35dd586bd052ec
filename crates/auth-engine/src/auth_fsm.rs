//! Authentication state machine using rust-fsm.
//!
//! Stored credentials decide whether a session exists; the machine adds the
//! transient states a caller can observe while an operation is running.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  LoginAttempt   ┌─────────────────┐
//! │   NotLoggedIn   │ ──────────────► │    LoggingIn    │
//! └─────────────────┘ ◄────────────── └────────┬────────┘
//!    ▲   │ SessionRestored  LoginFailed        │ LoginSuccess
//!    │   ▼                                     ▼
//!    │ ┌─────────────────────────────────────────────────┐
//!    │ │                    LoggedIn                     │
//!    │ └──────┬───────────────────┬──────────────▲───────┘
//!    │        │ LogoutRequested   │ TokenExpired │ RefreshSuccess
//!    │        ▼                   ▼              │
//!    │ ┌─────────────────┐  ┌─────────────────┐  │
//!    │ │   LoggingOut    │  │   Refreshing    │──┘
//!    │ └────────┬────────┘  └────────┬────────┘
//!    │          │ LogoutComplete     │ RefreshFailed
//!    └──────────┴────────────────────┘   (LoggedIn also SessionLost)
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(NotLoggedIn)

    NotLoggedIn => {
        LoginAttempt => LoggingIn,
        // Credentials found in storage, e.g. after migration or a restart
        SessionRestored => LoggedIn
    },
    LoggingIn => {
        LoginSuccess => LoggedIn,
        LoginFailed => NotLoggedIn
    },
    LoggedIn => {
        // Signing in again replaces the current session
        LoginAttempt => LoggingIn,
        TokenExpired => Refreshing,
        LogoutRequested => LoggingOut,
        // Session torn down outside the machine (refresh failure, 403)
        SessionLost => NotLoggedIn
    },
    Refreshing => {
        RefreshSuccess => LoggedIn,
        RefreshFailed => NotLoggedIn
    },
    LoggingOut => {
        LogoutComplete => NotLoggedIn
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Authentication state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    NotLoggedIn,
    LoggingIn,
    LoggedIn,
    Refreshing,
    LoggingOut,
}

impl AuthState {
    /// Returns true if the user has a valid session (LoggedIn state only).
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }

    /// Returns true while an operation is in progress.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthState::LoggingIn | AuthState::Refreshing | AuthState::LoggingOut
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::NotLoggedIn => AuthState::NotLoggedIn,
            AuthMachineState::LoggingIn => AuthState::LoggingIn,
            AuthMachineState::LoggedIn => AuthState::LoggedIn,
            AuthMachineState::Refreshing => AuthState::Refreshing,
            AuthMachineState::LoggingOut => AuthState::LoggingOut,
        }
    }
}
