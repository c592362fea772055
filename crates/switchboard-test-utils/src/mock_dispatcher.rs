// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock pull channel dispatcher.
//!
//! Models a server with exactly one valid token at a time. Requests carrying
//! any other token are answered as expired (or rejected, once revoked).
//! A refresh issues `token-N`, makes it the valid one, and can be slowed down
//! so tests can pile concurrent callers onto it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use switchboard_core::{AgentIdentity, AuthorizedRequest, PullRequest, RequestDispatcher, SwitchboardError};

use crate::fixtures;

/// One request as the mock server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub name: &'static str,
    pub token: Option<String>,
    pub body: Option<Value>,
}

struct ServerState {
    valid_token: Option<String>,
    revoked: bool,
    refresh_fails: bool,
    agent: AgentIdentity,
    responses: HashMap<&'static str, Value>,
    failures: HashMap<&'static str, VecDeque<(Option<u16>, String)>>,
    log: Vec<RecordedRequest>,
    sent: usize,
}

pub struct MockDispatcher {
    state: Mutex<ServerState>,
    refresh_delay: Duration,
    refresh_calls: AtomicUsize,
}

impl MockDispatcher {
    /// A server that accepts `token` and signs in as agent `a-1`.
    pub fn new(token: &str) -> Self {
        Self {
            state: Mutex::new(ServerState {
                valid_token: Some(token.to_string()),
                revoked: false,
                refresh_fails: false,
                agent: fixtures::agent("a-1"),
                responses: HashMap::new(),
                failures: HashMap::new(),
                log: Vec::new(),
                sent: 0,
            }),
            refresh_delay: Duration::ZERO,
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Make every refresh take `delay` before answering.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_agent(self, agent: AgentIdentity) -> Self {
        self.lock().agent = agent;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The currently valid token stops working; a refresh will mint a new one.
    pub fn expire_token(&self) {
        self.lock().valid_token = None;
    }

    /// Every token is rejected outright from now on.
    pub fn revoke(&self) {
        self.lock().revoked = true;
    }

    pub fn fail_refresh(&self) {
        self.lock().refresh_fails = true;
    }

    /// Canned body for every future request named `name`.
    pub fn set_response(&self, name: &'static str, body: Value) {
        self.lock().responses.insert(name, body);
    }

    /// The next request named `name` fails with a pull error.
    pub fn fail_next(&self, name: &'static str, status: Option<u16>, message: &str) {
        self.lock()
            .failures
            .entry(name)
            .or_default()
            .push_back((status, message.to_string()));
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().log.clone()
    }

    /// Requests named `name`, in arrival order.
    pub fn requests_named(&self, name: &str) -> Vec<RecordedRequest> {
        self.lock()
            .log
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }

    fn record(&self, request: &AuthorizedRequest) {
        let token = request
            .credential
            .as_ref()
            .map(|t| t.expose_secret().to_string());
        self.lock().log.push(RecordedRequest {
            name: request.request.name(),
            token,
            body: request.request.body(),
        });
    }

    async fn refresh(&self, request: &AuthorizedRequest) -> Result<Value, SwitchboardError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        let mut state = self.lock();
        if state.refresh_fails {
            return Err(SwitchboardError::pull(Some(500), "refresh endpoint failed"));
        }
        if state.revoked || request.credential.is_none() {
            return Err(SwitchboardError::CredentialInvalid("refresh refused".into()));
        }
        let token = format!("token-{n}");
        state.valid_token = Some(token.clone());
        Ok(json!({"token": token, "agent": state.agent, "expiresIn": 3600}))
    }

    fn authorize(&self, request: &AuthorizedRequest) -> Result<(), SwitchboardError> {
        let state = self.lock();
        if state.revoked {
            return Err(SwitchboardError::CredentialInvalid("token revoked".into()));
        }
        let presented = request.credential.as_ref().map(|t| t.expose_secret());
        match (presented, state.valid_token.as_deref()) {
            (Some(p), Some(v)) if p == v => Ok(()),
            _ => Err(SwitchboardError::CredentialExpired),
        }
    }

    fn respond(&self, request: &PullRequest) -> Result<Value, SwitchboardError> {
        let mut state = self.lock();
        let name = request.name();
        if let Some((status, message)) = state.failures.get_mut(name).and_then(VecDeque::pop_front) {
            return Err(SwitchboardError::pull(status, message));
        }
        if let Some(body) = state.responses.get(name) {
            return Ok(body.clone());
        }
        Ok(match request {
            PullRequest::QueueSnapshot
            | PullRequest::Messages { .. }
            | PullRequest::CompletedConversations => json!([]),
            PullRequest::Conversation { conversation_id } => {
                return Err(SwitchboardError::pull(
                    Some(404),
                    format!("conversation {conversation_id} not found"),
                ));
            }
            PullRequest::SendMessage { .. } => {
                state.sent += 1;
                json!({"success": true, "messageId": format!("srv-{}", state.sent)})
            }
            PullRequest::CurrentAgent => json!(state.agent),
            _ => json!({"success": true}),
        })
    }
}

#[async_trait]
impl RequestDispatcher for MockDispatcher {
    async fn dispatch(&self, request: &AuthorizedRequest) -> Result<Value, SwitchboardError> {
        self.record(request);
        match &request.request {
            PullRequest::RefreshCredential => self.refresh(request).await,
            PullRequest::Login { .. } => {
                let mut state = self.lock();
                let token = "token-login".to_string();
                state.valid_token = Some(token.clone());
                Ok(json!({"token": token, "agent": state.agent, "expiresIn": 3600}))
            }
            PullRequest::Logout => Ok(json!({})),
            other => {
                self.authorize(request)?;
                self.respond(other)
            }
        }
    }
}
