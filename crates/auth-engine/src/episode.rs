//! Single-flight refresh coordination.
//!
//! ## State Diagram
//!
//! ```text
//!            401, refresh token present
//!   ┌──────┐ ─────────────────────────► ┌─────────────────────────┐
//!   │ Idle │                            │ Refreshing(episode)     │◄─┐
//!   └──────┘ ◄───────────────────────── └─────────────────────────┘  │ 401: enqueue
//!            episode resolved once                   └───────────────┘
//! ```
//!
//! The state lives behind a `parking_lot::Mutex` that is only held for
//! check-and-set, never across an `.await` and never during storage I/O.
//! Credentials are read before locking; a generation counter bumped on
//! every return to `Idle` tells `begin` when those reads went stale.

use crate::{ApiError, ApiResult};
use parking_lot::Mutex;
use secure_scoped_storage::CredentialManager;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

type Waiter = oneshot::Sender<ApiResult<String>>;

/// One refresh attempt and the callers waiting on it.
#[derive(Debug)]
pub struct RefreshEpisode {
    id: u64,
    waiters: VecDeque<Waiter>,
}

impl RefreshEpisode {
    fn new(id: u64) -> Self {
        Self {
            id,
            waiters: VecDeque::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queued(&self) -> usize {
        self.waiters.len()
    }

    fn enqueue(&mut self) -> oneshot::Receiver<ApiResult<String>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        rx
    }

    /// Release every queued caller, in arrival order, with `result`.
    /// Consumes the episode so it resolves exactly once.
    pub fn resolve(self, result: &ApiResult<String>) -> usize {
        let released = self.waiters.len();
        for waiter in self.waiters {
            // A waiter whose future was dropped no longer cares.
            let _ = waiter.send(result.clone());
        }
        debug!(episode = self.id, released, ok = result.is_ok(), "Refresh episode resolved");
        released
    }
}

#[derive(Debug)]
enum PipelineState {
    Idle,
    Refreshing(RefreshEpisode),
}

/// What a caller that hit a 401 should do next.
pub(crate) enum Recovery {
    /// Lead a new episode by exchanging this refresh token.
    Lead { episode: u64, refresh_token: String },
    /// Wait for the episode in flight.
    Wait(oneshot::Receiver<ApiResult<String>>),
    /// The token was already replaced after this request was sent; replay with it.
    Replay(String),
    /// Nothing to refresh with.
    NoRefreshToken,
}

/// Owner of the process-wide refresh state.
#[derive(Debug)]
pub struct RefreshCoordinator {
    state: Mutex<PipelineState>,
    next_episode: AtomicU64,
    generation: AtomicU64,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Idle),
            next_episode: AtomicU64::new(1),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), PipelineState::Refreshing(_))
    }

    /// Decide, in one critical section, how a 401 is recovered.
    ///
    /// `sent_token` is the access token the failed request carried.
    pub(crate) fn begin(
        &self,
        credentials: &CredentialManager,
        sent_token: Option<&str>,
    ) -> Recovery {
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let current = credentials.access_token();
            let refresh_token = credentials.refresh_token();

            let mut state = self.state.lock();

            if let PipelineState::Refreshing(episode) = &mut *state {
                debug!(episode = episode.id, queued = episode.queued() + 1, "Queueing behind refresh");
                return Recovery::Wait(episode.enqueue());
            }

            // An episode ended while the credentials were being read.
            if self.generation.load(Ordering::Acquire) != generation {
                continue;
            }

            if let Some(current) = current {
                if sent_token != Some(current.as_str()) {
                    debug!("Access token changed since request was sent, replaying");
                    return Recovery::Replay(current);
                }
            }

            return match refresh_token {
                Some(refresh_token) => {
                    let id = self.next_episode.fetch_add(1, Ordering::Relaxed);
                    *state = PipelineState::Refreshing(RefreshEpisode::new(id));
                    debug!(episode = id, "Refresh episode started");
                    Recovery::Lead {
                        episode: id,
                        refresh_token,
                    }
                }
                None => Recovery::NoRefreshToken,
            };
        }
    }

    /// Return to `Idle`, handing back the episode `id` if it is the active one.
    pub(crate) fn finish(&self, id: u64) -> Option<RefreshEpisode> {
        let mut state = self.state.lock();
        match &*state {
            PipelineState::Refreshing(episode) if episode.id == id => {}
            _ => return None,
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        match std::mem::replace(&mut *state, PipelineState::Idle) {
            PipelineState::Refreshing(episode) => Some(episode),
            PipelineState::Idle => None,
        }
    }

    /// Guard that cancels episode `id` if dropped before being disarmed.
    pub(crate) fn guard(&self, id: u64) -> EpisodeGuard<'_> {
        EpisodeGuard {
            coordinator: self,
            id,
            armed: true,
        }
    }
}

/// Resolves an abandoned episode with [`ApiError::Cancelled`].
pub(crate) struct EpisodeGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    id: u64,
    armed: bool,
}

impl EpisodeGuard<'_> {
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(episode) = self.coordinator.finish(self.id) {
            tracing::warn!(episode = self.id, "Refresh abandoned, cancelling queued requests");
            episode.resolve(&Err(ApiError::Cancelled));
        }
    }
}
