//! # Client Session
//!
//! Per-connection adapter between the hub's outbound queue and the transport.
//! The hub only ever enqueues; the delivery task spawned here is the sole
//! consumer of the queue and the sole writer to the transport.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hub::HubHandle;

/// Upper bound on the goodbye write to a peer that may have stopped reading.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// A serialized event, shared by every session it is fanned out to.
pub type Frame = Arc<str>;

/// Opaque handle identifying one live viewer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

/// The outbound half of a viewer connection (e.g. a WebSocket sink).
#[async_trait]
pub trait Transport: Send + 'static {
    /// Writes one frame. Any error ends the session.
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()>;

    /// Called when the session ends for any reason other than a failed write.
    async fn close(&mut self) {}
}

/// Owns the receiving end of one session's bounded queue.
pub(crate) struct ClientSession<T> {
    id: SessionId,
    queue: mpsc::Receiver<Frame>,
    /// Fired by the hub when it evicts the session.
    release: CancellationToken,
    transport: T,
    hub: HubHandle,
}

impl<T: Transport> ClientSession<T> {
    pub(crate) fn new(
        id: SessionId,
        queue: mpsc::Receiver<Frame>,
        release: CancellationToken,
        transport: T,
        hub: HubHandle,
    ) -> Self {
        Self { id, queue, release, transport, hub }
    }

    /// Delivery loop: dequeue, write, repeat.
    ///
    /// Ends in one of three ways:
    /// - the hub drops the queue's sender (shutdown): what is already queued
    ///   is written first;
    /// - the hub evicts the session (unregister or overflow): pending frames
    ///   are discarded and an in-flight write is abandoned;
    /// - a write fails: the session asks the hub to forget it.
    ///
    /// The transport is closed on the first two paths.
    pub(crate) async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.release.cancelled() => break,
                frame = self.queue.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let written = tokio::select! {
                _ = self.release.cancelled() => break,
                written = self.transport.send(frame) => written,
            };
            if let Err(e) = written {
                debug!(session_id = %self.id, error = %e, "write failed; leaving live feed");
                self.hub.unregister(self.id);
                return;
            }
        }

        if tokio::time::timeout(CLOSE_GRACE, self.transport.close()).await.is_err() {
            debug!(session_id = %self.id, "peer did not take the close frame");
        }
        debug!(session_id = %self.id, evicted = self.release.is_cancelled(), "delivery task finished");
    }
}

/// Returned to whoever registered the transport.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    delivery: JoinHandle<()>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, delivery: JoinHandle<()>) -> Self {
        Self { id, delivery }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Waits for the delivery task to stop.
    pub async fn finished(self) {
        // A panic inside the transport only affects this viewer.
        if let Err(e) = self.delivery.await {
            debug!(session_id = %self.id, error = %e, "delivery task ended abnormally");
        }
    }
}
