//! Live feed over WebSocket.
//!
//! The write half becomes the session's `Transport`; the hub's delivery task
//! owns it from then on. The read half is only watched for the peer leaving,
//! inbound frames are ignored.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rb_hub::{Frame, HubHandle, Transport};
use tracing::{debug, info};

use crate::AppState;

pub struct WsTransport {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        self.sink.send(WsMessage::Text(frame.to_string().into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| live_feed(socket, state.hub))
}

async fn live_feed(socket: WebSocket, hub: HubHandle) {
    let (sink, mut stream) = socket.split();

    let session = match hub.register(WsTransport { sink }).await {
        Ok(session) => session,
        Err(e) => {
            debug!(error = %e, "live feed unavailable; dropping connection");
            return;
        }
    };
    let id = session.id();
    info!(session_id = %id, "viewer connected");

    let finished = session.finished();
    tokio::pin!(finished);

    let peer_left = loop {
        tokio::select! {
            // Hub released the session (overflow, failed write or shutdown).
            _ = &mut finished => break false,
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break true,
                Some(Ok(_)) => {}
            },
        }
    };

    if peer_left {
        hub.unregister(id);
        finished.await;
    }
    info!(session_id = %id, "viewer disconnected");
}
