// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock push channel.
//!
//! Every successful `open()` hands the test a [`MockServer`] through
//! [`MockConnector::next_session`]. The test then plays the server: it reads
//! what the client wrote, pushes frames back, and closes the socket.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use switchboard_core::{Envelope, EventKind, PushConnector, PushSocket, SwitchboardError};
use tokio::sync::Mutex as AsyncMutex;

pub struct MockConnector {
    sessions_tx: mpsc::UnboundedSender<MockServer>,
    sessions_rx: AsyncMutex<mpsc::UnboundedReceiver<MockServer>>,
    refuse_next: AtomicUsize,
    opens: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        let (sessions_tx, sessions_rx) = mpsc::unbounded();
        Self {
            sessions_tx,
            sessions_rx: AsyncMutex::new(sessions_rx),
            refuse_next: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// The next `n` open attempts fail.
    pub fn refuse_next(&self, n: usize) {
        self.refuse_next.store(n, Ordering::SeqCst);
    }

    /// Wait for the next accepted connection.
    pub async fn next_session(&self) -> MockServer {
        self.sessions_rx
            .lock()
            .await
            .next()
            .await
            .expect("connector dropped")
    }

    /// Open attempts so far, accepted or refused.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushConnector for MockConnector {
    async fn open(&self, url: &str) -> Result<PushSocket, SwitchboardError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(url.to_string());

        let refused = self
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SwitchboardError::transport("connection refused"));
        }

        let (client_tx, server_rx) = mpsc::unbounded::<String>();
        let (server_tx, client_rx) = mpsc::unbounded::<Result<String, SwitchboardError>>();

        let server = MockServer {
            from_client: server_rx,
            to_client: server_tx,
            url: url.to_string(),
        };
        self.sessions_tx
            .unbounded_send(server)
            .map_err(|e| SwitchboardError::transport(e.to_string()))?;

        Ok(PushSocket {
            sink: Box::pin(
                client_tx.sink_map_err(|e| SwitchboardError::transport(format!("socket closed: {e}"))),
            ),
            stream: Box::pin(client_rx),
        })
    }
}

/// Server side of one mock connection.
pub struct MockServer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String, SwitchboardError>>,
    pub url: String,
}

impl MockServer {
    /// Push a frame to the client.
    pub fn push(&self, kind: EventKind, payload: Value) {
        let frame = Envelope::new(kind, payload)
            .encode()
            .expect("encodable frame");
        self.push_raw(&frame);
    }

    /// Push arbitrary text, malformed or not.
    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.unbounded_send(Ok(text.to_string()));
    }

    /// Next frame the client wrote, or `None` once the client hung up.
    pub async fn next_frame(&mut self) -> Option<Envelope> {
        let text = self.from_client.next().await?;
        Some(Envelope::decode(&text).expect("client wrote a valid envelope"))
    }

    /// Next non-ping frame.
    pub async fn next_non_ping(&mut self) -> Option<Envelope> {
        loop {
            let frame = self.next_frame().await?;
            if frame.kind() != Some(EventKind::Ping) {
                return Some(frame);
            }
        }
    }

    /// Frames already written, without waiting.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut frames = Vec::new();
        while let Ok(Some(text)) = self.from_client.try_next() {
            if let Ok(frame) = Envelope::decode(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Answer a ping.
    pub fn pong(&self) {
        self.push(EventKind::Pong, Value::Null);
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        self.to_client.close_channel();
    }

    /// Stop accepting client writes; the client's next send fails.
    pub fn break_writes(&mut self) {
        self.from_client.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let connector = MockConnector::new();
        let mut socket = connector.open("ws://test?token=t").await.unwrap();
        let mut server = connector.next_session().await;
        assert_eq!(server.url, "ws://test?token=t");

        socket.sink.send("{\"type\":\"ping\"}".into()).await.unwrap();
        assert_eq!(server.next_frame().await.unwrap().kind(), Some(EventKind::Ping));

        server.push(EventKind::QueueUpdated, json!([]));
        let text = socket.stream.next().await.unwrap().unwrap();
        assert!(text.contains("queue:updated"));

        server.close();
        assert!(socket.stream.next().await.is_none());
    }

    #[tokio::test]
    async fn refused_opens_are_counted() {
        let connector = MockConnector::new();
        connector.refuse_next(1);
        assert!(connector.open("ws://a").await.is_err());
        assert!(connector.open("ws://a").await.is_ok());
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test]
    async fn broken_writes_error_on_send() {
        let connector = MockConnector::new();
        let mut socket = connector.open("ws://a").await.unwrap();
        let mut server = connector.next_session().await;
        server.break_writes();
        assert!(socket.sink.send("x".into()).await.is_err());
    }
}
