//! # Broadcast Hub
//!
//! A single coordinator task owns the set of live sessions. Register,
//! unregister and publish requests reach it through one queue and are handled
//! strictly in arrival order, so the registry is never touched from two places.
//!
//! Fan-out is a non-blocking `try_send` onto each session's bounded queue. A
//! full queue means a slow or dead viewer: that session is evicted on the spot
//! instead of stalling the publisher or anyone else. Eviction also fires the
//! session's release token, so a delivery task stuck in a write still ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rb_core::{BoardEvent, EventPublisher};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{ClientSession, Frame, SessionHandle, SessionId, Transport};

/// Default per-session outbound queue size.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("broadcast hub is shut down")]
    Closed,
}

enum Command {
    Register {
        id: SessionId,
        entry: Entry,
        ack: oneshot::Sender<bool>,
    },
    Unregister(SessionId),
    Publish(BoardEvent),
    LiveSessions(oneshot::Sender<usize>),
    Shutdown,
}

/// The hub's side of one session.
struct Entry {
    queue: mpsc::Sender<Frame>,
    release: CancellationToken,
}

/// The coordinator. Lives inside its own task; talk to it through [`HubHandle`].
pub struct Hub {
    commands: mpsc::UnboundedReceiver<Command>,
    sessions: HashMap<SessionId, Entry>,
}

impl Hub {
    /// Starts the coordinator task.
    pub fn spawn(queue_capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Hub {
            commands: rx,
            sessions: HashMap::new(),
        };
        let handle = HubHandle {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(0)),
            queue_capacity: queue_capacity.max(1),
        };
        (handle, tokio::spawn(hub.run()))
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register { id, entry, ack } => {
                    self.sessions.insert(id, entry);
                    debug!(session_id = %id, live = self.sessions.len(), "viewer registered");
                    if ack.send(true).is_err() {
                        // Registrant gave up before hearing back.
                        self.evict(id);
                    }
                }
                Command::Unregister(id) => {
                    if self.evict(id) {
                        debug!(session_id = %id, live = self.sessions.len(), "viewer unregistered");
                    }
                }
                Command::Publish(event) => self.fan_out(&event),
                Command::LiveSessions(reply) => {
                    let _ = reply.send(self.sessions.len());
                }
                Command::Shutdown => break,
            }
        }

        // Dropping the senders without releasing lets each delivery task
        // flush what it holds and stop.
        info!(released = self.sessions.len(), "broadcast hub stopping");
        self.sessions.clear();
    }

    fn fan_out(&mut self, event: &BoardEvent) {
        let frame: Frame = match event.to_frame() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "failed to serialize event");
                return;
            }
        };

        let mut dropped = Vec::new();
        for (id, entry) in &self.sessions {
            match entry.queue.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(session_id = %id, "outbound queue full; disconnecting slow viewer");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }
        for id in &dropped {
            self.evict(*id);
        }

        debug!(
            kind = event.kind(),
            message_id = event.message().id,
            recipients = self.sessions.len(),
            dropped = dropped.len(),
            "broadcast event"
        );
    }

    /// Forgets a session and tells its delivery task to stop. Returns whether
    /// it was still registered.
    fn evict(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(entry) => {
                entry.release.cancel();
                true
            }
            None => false,
        }
    }
}

/// Cheap, cloneable front door to the coordinator.
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Register { id, .. } => write!(f, "Register({id})"),
            Command::Unregister(id) => write!(f, "Unregister({id})"),
            Command::Publish(event) => write!(f, "Publish({})", event.kind()),
            Command::LiveSessions(_) => f.write_str("LiveSessions"),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl HubHandle {
    /// Adds a freshly handshaken transport to the live feed and starts its
    /// delivery task.
    pub async fn register<T: Transport>(&self, transport: T) -> Result<SessionHandle, HubError> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
        let release = CancellationToken::new();
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(Command::Register {
                id,
                entry: Entry {
                    queue: queue_tx,
                    release: release.clone(),
                },
                ack: ack_tx,
            })
            .map_err(|_| HubError::Closed)?;

        match ack_rx.await {
            Ok(true) => {}
            _ => return Err(HubError::Closed),
        }

        let session = ClientSession::new(id, queue_rx, release, transport, self.clone());
        Ok(SessionHandle::new(id, tokio::spawn(session.run())))
    }

    /// Removes a session from the live set. No-op if it is already gone.
    pub fn unregister(&self, id: SessionId) {
        let _ = self.commands.send(Command::Unregister(id));
    }

    /// Queues an event for fan-out. Never waits on any viewer.
    pub fn publish(&self, event: BoardEvent) {
        if self.commands.send(Command::Publish(event)).is_err() {
            debug!("broadcast hub stopped; event discarded");
        }
    }

    /// Number of registered sessions, as seen by the coordinator.
    pub async fn live_sessions(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::LiveSessions(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Stops accepting registrations and releases every session queue.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl EventPublisher for HubHandle {
    fn publish(&self, event: BoardEvent) {
        HubHandle::publish(self, event);
    }
}
