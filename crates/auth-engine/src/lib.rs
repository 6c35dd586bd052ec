//! Authentication core for the console.
//!
//! This crate provides:
//! - A request pipeline that decorates calls, unwraps the backend envelope
//!   and maps failures to user notices
//! - Single-flight token refresh shared by concurrent 401s
//! - Session management with an explicit FSM over stored credentials
//! - Route entry checks

mod auth_fsm;
mod episode;
mod error;
mod guard;
mod hooks;
mod pipeline;
mod session;
mod transport;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState};
pub use episode::{RefreshCoordinator, RefreshEpisode};
pub use error::{ApiError, ApiResult, AuthError, AuthResult};
pub use guard::{check_route, GuardDecision, RouteMeta, Routes};
pub use hooks::{LoggingUiHooks, Notice, UiHooks};
pub use pipeline::{generate_trade_id, ApiRequest, RequestPipeline, TokenPair, TRADE_ID_HEADER};
pub use session::{AuthStateCallback, ConsoleSession};
pub use transport::{HttpTransport, OutboundRequest, RawResponse, ReqwestTransport};
