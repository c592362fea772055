// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential lifecycle coordinator.
//!
//! State machine: `Idle -> Refreshing -> Idle`. The first caller to see an
//! expired credential becomes the refresh leader; everyone arriving while the
//! refresh is in flight parks a oneshot waiter and is released with the
//! leader's outcome. A drop guard clears the in-flight flag even if the
//! leader's future is cancelled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use switchboard_bus::{EventBus, StateCell, Subscription};
use switchboard_core::{
    AgentIdentity, AuthorizedRequest, CredentialStore, PullRequest, RequestDispatcher,
    SessionGrant, SwitchboardError,
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::credential::{Credential, StoredSession};

type Waiter = oneshot::Sender<Result<SecretString, String>>;

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
}

#[derive(Default)]
struct RefreshState {
    credential: Option<Credential>,
    refreshing: bool,
    waiters: Vec<Waiter>,
}

/// Attaches credentials to pull requests and recovers from expiry.
pub struct CredentialCoordinator {
    dispatcher: Arc<dyn RequestDispatcher>,
    store: Arc<dyn CredentialStore>,
    blob_name: String,
    state: Mutex<RefreshState>,
    identity: StateCell<Option<AgentIdentity>>,
    events: EventBus<SessionEvent>,
}

impl CredentialCoordinator {
    pub fn new(
        dispatcher: Arc<dyn RequestDispatcher>,
        store: Arc<dyn CredentialStore>,
        blob_name: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            blob_name: blob_name.into(),
            state: Mutex::new(RefreshState::default()),
            identity: StateCell::new(None),
            events: EventBus::new(16),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a persisted session. Expired or unreadable blobs are discarded.
    ///
    /// Returns whether a usable session was restored.
    pub async fn restore(&self) -> Result<bool, SwitchboardError> {
        let Some(blob) = self.store.get(&self.blob_name).await? else {
            return Ok(false);
        };

        let session: StoredSession = match serde_json::from_str(&blob) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored session");
                self.store.clear(&self.blob_name).await?;
                return Ok(false);
            }
        };

        let (credential, agent) = session.into_parts();
        if credential.is_expired(Utc::now()) {
            info!("stored session has expired");
            self.store.clear(&self.blob_name).await?;
            return Ok(false);
        }

        self.lock_state().credential = Some(credential);
        self.identity.set(agent);
        debug!("session restored from store");
        Ok(true)
    }

    /// Exchange email and password for a session.
    pub async fn login(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<AgentIdentity, SwitchboardError> {
        let request = AuthorizedRequest::anonymous(PullRequest::Login {
            email: email.to_string(),
            password,
        });
        let grant: SessionGrant = decode_grant(self.dispatcher.dispatch(&request).await?)?;
        let agent = grant.agent.clone().ok_or_else(|| {
            SwitchboardError::pull(None, "login response did not include the agent")
        })?;

        self.lock_state().credential = Some(Credential::from_grant(&grant, Utc::now()));
        self.identity.set(Some(agent.clone()));
        self.persist().await;
        self.events.emit(SessionEvent::LoggedIn);
        info!(agent_id = %agent.id, "logged in");
        Ok(agent)
    }

    /// Install a session obtained elsewhere (pre-issued token, tests).
    pub async fn establish(&self, credential: Credential, agent: Option<AgentIdentity>) {
        self.lock_state().credential = Some(credential);
        self.identity.set(agent);
        self.persist().await;
        self.events.emit(SessionEvent::LoggedIn);
    }

    /// Pair `request` with the current credential, if any.
    pub fn attach(&self, request: PullRequest) -> AuthorizedRequest {
        let credential = self
            .lock_state()
            .credential
            .as_ref()
            .map(|c| c.token.clone());
        AuthorizedRequest {
            request,
            credential,
        }
    }

    /// Attach, dispatch, and recover from a 401-equivalent answer.
    pub async fn execute(&self, request: PullRequest) -> Result<Value, SwitchboardError> {
        let attached = self.attach(request);
        match self.dispatcher.dispatch(&attached).await {
            Err(err) if err.is_unauthorized() && !attached.request.is_session_request() => {
                self.handle_unauthorized(attached, err).await
            }
            other => other,
        }
    }

    /// Recover a request the server rejected.
    ///
    /// `CredentialExpired` refreshes (shared with any concurrent callers) and
    /// retries once. `CredentialInvalid` logs out and hands the error back.
    pub async fn handle_unauthorized(
        &self,
        request: AuthorizedRequest,
        error: SwitchboardError,
    ) -> Result<Value, SwitchboardError> {
        match error {
            SwitchboardError::CredentialExpired => {
                let token = self.refresh_shared(request.credential.as_ref()).await?;
                let retry = AuthorizedRequest {
                    request: request.request,
                    credential: Some(token),
                };
                debug!(request = retry.request.name(), "retrying with refreshed credential");
                match self.dispatcher.dispatch(&retry).await {
                    Err(err @ SwitchboardError::CredentialInvalid(_)) => {
                        self.logout().await;
                        Err(err)
                    }
                    other => other,
                }
            }
            err @ SwitchboardError::CredentialInvalid(_) => {
                warn!(request = request.request.name(), "credential rejected, logging out");
                self.logout().await;
                Err(err)
            }
            other => Err(other),
        }
    }

    /// Obtain a fresh credential, refreshing at most once across concurrent callers.
    ///
    /// `stale` is the token the caller's request carried. If the current
    /// credential already differs, that one is returned without a refresh.
    pub async fn refresh_shared(
        &self,
        stale: Option<&SecretString>,
    ) -> Result<SecretString, SwitchboardError> {
        let parked = {
            let mut state = self.lock_state();
            if let (Some(current), Some(stale)) = (&state.credential, stale)
                && !current.same_token(stale)
            {
                return Ok(current.token.clone());
            }
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = parked {
            debug!("refresh in flight, waiting for its outcome");
            return match rx.await {
                Ok(Ok(token)) => Ok(token),
                Ok(Err(message)) => Err(SwitchboardError::RefreshFailed(message)),
                Err(_) => Err(SwitchboardError::RefreshFailed(
                    "refresh was abandoned".to_string(),
                )),
            };
        }

        let guard = RefreshGuard {
            coordinator: self,
            armed: true,
        };
        match self.perform_refresh().await {
            Ok(grant) => {
                let credential = Credential::from_grant(&grant, Utc::now());
                let token = credential.token.clone();
                guard.succeed(credential);
                if let Some(agent) = grant.agent {
                    self.identity.set(Some(agent));
                }
                self.persist().await;
                self.events.emit(SessionEvent::Refreshed);
                info!("credential refreshed");
                Ok(token)
            }
            Err(err) => {
                let message = err.to_string();
                guard.fail(message.clone());
                warn!(error = %message, "credential refresh failed, logging out");
                self.logout().await;
                Err(SwitchboardError::RefreshFailed(message))
            }
        }
    }

    async fn perform_refresh(&self) -> Result<SessionGrant, SwitchboardError> {
        let request = self.attach(PullRequest::RefreshCredential);
        if request.credential.is_none() {
            return Err(SwitchboardError::NoCredential);
        }
        decode_grant(self.dispatcher.dispatch(&request).await?)
    }

    /// Best-effort server logout, then drop all local session state.
    pub async fn logout(&self) {
        let request = self.attach(PullRequest::Logout);
        if request.credential.is_some()
            && let Err(e) = self.dispatcher.dispatch(&request).await
        {
            debug!(error = %e, "server logout failed, clearing local session anyway");
        }

        let had_session = self.lock_state().credential.take().is_some();
        self.identity.set(None);
        if let Err(e) = self.store.clear(&self.blob_name).await {
            warn!(error = %e, "failed to clear stored session");
        }
        if had_session {
            self.events.emit(SessionEvent::LoggedOut);
            info!("logged out");
        }
    }

    /// True when a credential is held and has not passed its expiry.
    pub fn is_logged_in(&self) -> bool {
        self.lock_state()
            .credential
            .as_ref()
            .is_some_and(|c| !c.is_expired(Utc::now()))
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// The current bearer token, if any.
    pub fn token(&self) -> Option<SecretString> {
        self.lock_state().credential.as_ref().map(|c| c.token.clone())
    }

    pub fn identity(&self) -> Option<AgentIdentity> {
        self.identity.get()
    }

    pub fn subscribe_identity(&self) -> watch::Receiver<Option<AgentIdentity>> {
        self.identity.subscribe()
    }

    pub fn subscribe_events(&self) -> Subscription<SessionEvent> {
        self.events.subscribe()
    }

    /// Replace the published identity (e.g. after `agent:status:updated`).
    pub async fn update_identity(&self, agent: AgentIdentity) {
        debug!(agent_id = %agent.id, status = %agent.status, "identity updated");
        self.identity.set(Some(agent));
        self.persist().await;
    }

    /// Re-fetch the signed-in agent from the server.
    pub async fn refresh_identity(&self) -> Result<AgentIdentity, SwitchboardError> {
        let value = self.execute(PullRequest::CurrentAgent).await?;
        let agent: AgentIdentity = serde_json::from_value(value).map_err(|e| {
            SwitchboardError::Pull {
                status: None,
                message: format!("invalid agent payload: {e}"),
                source: Some(Box::new(e)),
            }
        })?;
        self.update_identity(agent.clone()).await;
        Ok(agent)
    }

    async fn persist(&self) {
        let blob = {
            let state = self.lock_state();
            let Some(credential) = state.credential.as_ref() else {
                return;
            };
            serde_json::to_string(&StoredSession::new(credential, self.identity.get()))
        };
        let result = match blob {
            Ok(blob) => self.store.set(&self.blob_name, &blob).await,
            Err(e) => Err(SwitchboardError::Internal(e.to_string())),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist session");
        }
    }
}

impl std::fmt::Debug for CredentialCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("CredentialCoordinator")
            .field("has_credential", &state.credential.is_some())
            .field("refreshing", &state.refreshing)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

fn decode_grant(value: Value) -> Result<SessionGrant, SwitchboardError> {
    serde_json::from_value(value).map_err(|e| SwitchboardError::Pull {
        status: None,
        message: format!("invalid session grant: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Owns the `refreshing` flag for the leader. Settles waiters exactly once.
struct RefreshGuard<'a> {
    coordinator: &'a CredentialCoordinator,
    armed: bool,
}

impl RefreshGuard<'_> {
    fn succeed(mut self, credential: Credential) {
        let token = credential.token.clone();
        let waiters = {
            let mut state = self.coordinator.lock_state();
            state.credential = Some(credential);
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        self.armed = false;
        for waiter in waiters {
            let _ = waiter.send(Ok(token.clone()));
        }
    }

    fn fail(mut self, message: String) {
        self.release(message);
    }

    fn release(&mut self, message: String) {
        let waiters = {
            let mut state = self.coordinator.lock_state();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        self.armed = false;
        for waiter in waiters {
            let _ = waiter.send(Err(message.clone()));
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("refresh leader cancelled, releasing waiters");
            self.release("refresh was cancelled".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Refresh never completes; everything else is unauthorized.
    struct StuckRefresh {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestDispatcher for StuckRefresh {
        async fn dispatch(&self, request: &AuthorizedRequest) -> Result<Value, SwitchboardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request.request {
                PullRequest::RefreshCredential => std::future::pending().await,
                _ => Err(SwitchboardError::CredentialExpired),
            }
        }
    }

    fn coordinator(dispatcher: Arc<dyn RequestDispatcher>) -> CredentialCoordinator {
        CredentialCoordinator::new(dispatcher, Arc::new(MemoryCredentialStore::new()), "session")
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_leader_does_not_wedge_the_coordinator() {
        let coordinator = coordinator(Arc::new(StuckRefresh {
            calls: AtomicUsize::new(0),
        }));
        coordinator
            .establish(Credential::new("t-1", None), None)
            .await;

        let stale = coordinator.token();
        let leader = coordinator.refresh_shared(stale.as_ref());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), leader).await;
        assert!(timed_out.is_err());
        assert!(!coordinator.is_refreshing(), "flag must clear on cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_is_released_when_leader_is_cancelled() {
        let coordinator = coordinator(Arc::new(StuckRefresh {
            calls: AtomicUsize::new(0),
        }));
        coordinator
            .establish(Credential::new("t-1", None), None)
            .await;
        let stale = coordinator.token();

        let outcome = {
            let leader = coordinator.refresh_shared(stale.as_ref());
            let follower = coordinator.refresh_shared(stale.as_ref());
            tokio::pin!(leader);
            tokio::pin!(follower);
            tokio::select! {
                biased;
                _ = &mut leader => unreachable!("refresh never completes"),
                _ = &mut follower => unreachable!("leader is still in flight"),
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
            assert!(coordinator.is_refreshing());
            drop(leader);
            follower.await
        };
        assert!(matches!(outcome, Err(SwitchboardError::RefreshFailed(_))));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn attach_without_credential_is_anonymous() {
        let coordinator = coordinator(Arc::new(StuckRefresh {
            calls: AtomicUsize::new(0),
        }));
        let request = coordinator.attach(PullRequest::QueueSnapshot);
        assert!(request.credential.is_none());
        assert!(!coordinator.is_logged_in());
    }

    #[tokio::test]
    async fn stale_token_short_circuits_to_current() {
        let dispatcher = Arc::new(StuckRefresh {
            calls: AtomicUsize::new(0),
        });
        let coordinator = coordinator(dispatcher.clone());
        coordinator
            .establish(Credential::new("t-2", None), None)
            .await;

        let stale = SecretString::from("t-1".to_string());
        let token = coordinator.refresh_shared(Some(&stale)).await.unwrap();
        assert_eq!(secrecy::ExposeSecret::expose_secret(&token), "t-2");
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 0);
    }
}
