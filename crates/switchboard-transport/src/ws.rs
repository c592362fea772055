// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket [`PushConnector`] over tokio-tungstenite.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use switchboard_core::{PushConnector, PushSocket, SwitchboardError};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Opens text-frame WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn open(&self, url: &str) -> Result<PushSocket, SwitchboardError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| SwitchboardError::Transport {
                message: format!("websocket handshake failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        debug!(status = %response.status(), "websocket connected");

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(|e| SwitchboardError::Transport {
                message: format!("websocket write failed: {e}"),
                source: Some(Box::new(e)),
            })
            .with(|text: String| future::ready(Ok::<_, SwitchboardError>(Message::text(text))));

        let stream = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                Ok(Message::Close(frame)) => Some(Err(SwitchboardError::transport(format!(
                    "closed by server: {}",
                    frame.map(|f| f.reason.to_string()).unwrap_or_default()
                )))),
                Ok(_) => None,
                Err(e) => Some(Err(SwitchboardError::Transport {
                    message: format!("websocket read failed: {e}"),
                    source: Some(Box::new(e)),
                })),
            })
        });

        Ok(PushSocket {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
