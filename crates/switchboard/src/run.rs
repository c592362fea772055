// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard run`: wire the sync core and keep it alive until shutdown.

use std::sync::Arc;

use switchboard_auth::{CredentialCoordinator, FileCredentialStore};
use switchboard_config::SwitchboardConfig;
use switchboard_core::{ConversationRecord, SwitchboardError};
use switchboard_gateway::{AuthorizedPullChannel, ConversationGateway, HttpDispatcher};
use switchboard_queue::{QueueSettings, ReconciliationService};
use switchboard_transport::{TransportManager, TransportSettings, WsConnector};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown::install_signal_handler;

/// The wired sync core.
pub struct Console {
    pub credentials: Arc<CredentialCoordinator>,
    pub transport: TransportManager,
    pub queue: ReconciliationService,
    pub gateway: ConversationGateway,
}

impl Console {
    pub fn from_config(config: &SwitchboardConfig) -> Result<Self, SwitchboardError> {
        let dispatcher = Arc::new(HttpDispatcher::from_config(config)?);
        let store = Arc::new(FileCredentialStore::new(&config.credentials.store_path));
        let credentials = Arc::new(CredentialCoordinator::new(
            dispatcher,
            store,
            config.credentials.blob_name.clone(),
        ));

        let transport = TransportManager::new(
            TransportSettings::from_config(config),
            Arc::new(WsConnector),
            credentials.clone(),
        );
        let pull = Arc::new(AuthorizedPullChannel::new(credentials.clone()));
        let queue = ReconciliationService::new(
            QueueSettings::from_config(config),
            transport.clone(),
            pull.clone(),
            credentials.subscribe_identity(),
        );
        let gateway = ConversationGateway::new(
            transport.clone(),
            pull,
            queue.clone(),
            credentials.clone(),
        );

        Ok(Self {
            credentials,
            transport,
            queue,
            gateway,
        })
    }
}

pub async fn run_console(config: SwitchboardConfig) -> Result<(), SwitchboardError> {
    init_tracing(&config.console.log_level);
    info!(api_url = %config.server.api_url, "starting switchboard");

    let console = Console::from_config(&config)?;
    if !console.credentials.restore().await? {
        return Err(SwitchboardError::CredentialInvalid(
            "no stored session, run `switchboard login` first".into(),
        ));
    }
    if let Some(agent) = console.credentials.identity() {
        info!(agent_id = %agent.id, status = %agent.status, "session restored");
    }

    let cancel = install_signal_handler();
    let listener = console.transport.spawn_session_listener(cancel.clone());
    let service = tokio::spawn(console.queue.clone().run(cancel.clone()));
    let watcher = tokio::spawn(log_queue_changes(
        console.queue.subscribe_queue(),
        console.queue.subscribe_active(),
        cancel.clone(),
    ));

    if let Err(e) = console.transport.connect().await {
        warn!(error = %e, "initial connect failed, retrying in the background");
    }

    cancel.cancelled().await;
    info!("shutting down");
    console.transport.disconnect();

    join("session listener", listener).await;
    join("queue service", service).await;
    join("queue watcher", watcher).await;
    info!("switchboard stopped");
    Ok(())
}

async fn join(name: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(task = name, error = %e, "task ended abnormally");
    }
}

async fn log_queue_changes(
    mut queue: watch::Receiver<Vec<ConversationRecord>>,
    mut active: watch::Receiver<Option<ConversationRecord>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = queue.changed() => {
                if changed.is_err() {
                    break;
                }
                let records = queue.borrow_and_update();
                let unassigned = records
                    .iter()
                    .filter(|c| c.assigned_agent_id.is_none())
                    .count();
                info!(conversations = records.len(), unassigned, "queue updated");
            }
            changed = active.changed() => {
                if changed.is_err() {
                    break;
                }
                match active.borrow_and_update().as_ref() {
                    Some(record) => info!(
                        conversation_id = %record.conversation_id,
                        messages = record.messages.len(),
                        "active conversation"
                    ),
                    None => info!("no active conversation"),
                }
            }
        }
    }
    debug!("queue watcher stopped");
}

/// Initializes the tracing subscriber with an env filter.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_wires_from_default_config() {
        let config = SwitchboardConfig::default();
        let console = Console::from_config(&config).unwrap();
        assert!(console.queue.queue().is_empty());
        assert!(console.credentials.identity().is_none());
    }

    #[tokio::test]
    async fn watcher_stops_on_cancel() {
        let (_queue_tx, queue_rx) = watch::channel(Vec::new());
        let (_active_tx, active_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(log_queue_changes(queue_rx, active_rx, cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
