//! Fixtures shared by the cross-crate tests: a fully wired board on an
//! in-memory SQLite store, a fixed account table and a frame-capturing viewer.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use rb_api::AppState;
use rb_auth_simple::{hash_token, Account, SimpleAuthProvider};
use rb_core::testing::ManualClock;
use rb_core::AuthProvider;
use rb_db_sqlite::SqliteBoardRepo;
use rb_hub::{Frame, Hub, HubHandle, Transport};
use rb_services::{BoardPolicy, BoardService};
use tokio::sync::mpsc;

pub const MOD_TOKEN: &str = "mod-token";
pub const BOB_TOKEN: &str = "bob-token";
pub const BANNED_TOKEN: &str = "banned-token";

pub const BOB_ID: i64 = 2;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
}

pub fn accounts() -> Vec<Account> {
    let account = |id, username: &str, role: &str, banned, token: &str| Account {
        id,
        username: username.into(),
        role: role.into(),
        banned,
        token_sha256: hash_token(token),
    };
    vec![
        account(1, "mod", "moderator", false, MOD_TOKEN),
        account(BOB_ID, "bob", "user", false, BOB_TOKEN),
        account(3, "mallory", "user", true, BANNED_TOKEN),
    ]
}

/// A running board with every real component except the wall clock.
pub struct TestBoard {
    pub board: Arc<BoardService>,
    pub hub: HubHandle,
    pub clock: Arc<ManualClock>,
    pub auth: Arc<dyn AuthProvider>,
}

impl TestBoard {
    pub async fn start() -> Self {
        let repo = SqliteBoardRepo::new("sqlite::memory:").await.expect("in-memory SQLite");
        let auth: Arc<dyn AuthProvider> = Arc::new(SimpleAuthProvider::new(accounts()));
        let clock = Arc::new(ManualClock::new(epoch()));
        let (hub, _coordinator) = Hub::spawn(32);

        let board = Arc::new(BoardService::new(
            Arc::new(repo),
            Arc::clone(&auth),
            Arc::new(hub.clone()),
            clock.clone(),
            BoardPolicy::default(),
        ));

        Self { board, hub, clock, auth }
    }

    pub fn router(&self) -> Router {
        rb_api::router(AppState {
            board: Arc::clone(&self.board),
            auth: Arc::clone(&self.auth),
            hub: self.hub.clone(),
        })
    }

    /// Registers an in-process viewer and returns the frames it receives.
    pub async fn viewer(&self) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .register(CapturingTransport { frames: tx })
            .await
            .expect("hub accepts viewers");
        rx
    }
}

struct CapturingTransport {
    frames: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl Transport for CapturingTransport {
    async fn send(&mut self, frame: Frame) -> anyhow::Result<()> {
        self.frames.send(frame).map_err(|_| anyhow::anyhow!("viewer went away"))
    }
}

/// Parses a live-feed frame into JSON.
pub fn decode(frame: &str) -> serde_json::Value {
    serde_json::from_str(frame).expect("frames are JSON")
}
