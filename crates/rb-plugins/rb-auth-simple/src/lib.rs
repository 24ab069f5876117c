//! # rb-auth-simple
//!
//! In-process implementation of `AuthProvider`.
//! Users come from a static account table; bearer tokens are matched by their
//! SHA-256 digest so plain tokens never sit in configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use rb_core::models::User;
use rb_core::traits::AuthProvider;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// One configured account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub banned: bool,
    /// Hex-encoded SHA-256 of the account's bearer token.
    pub token_sha256: String,
}

impl Account {
    fn to_user(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            role: self.role.clone(),
            banned: self.banned,
        }
    }
}

/// Hex SHA-256 of a bearer token, the form stored in the account table.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct SimpleAuthProvider {
    by_id: HashMap<i64, Account>,
    // digest -> account id
    by_token: HashMap<String, i64>,
}

impl SimpleAuthProvider {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_token = HashMap::new();

        for account in accounts {
            let digest = account.token_sha256.trim().to_ascii_lowercase();
            if by_token.insert(digest, account.id).is_some() {
                warn!(user_id = account.id, "duplicate token digest in account table; last one wins");
            }
            if let Some(previous) = by_id.insert(account.id, account) {
                warn!(user_id = previous.id, "duplicate account id; last one wins");
            }
        }

        debug!(accounts = by_id.len(), "simple auth provider loaded");
        Self { by_id, by_token }
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.by_id.get(&id).map(Account::to_user))
    }

    async fn validate_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        let user = self
            .by_token
            .get(&hash_token(token))
            .and_then(|id| self.by_id.get(id))
            .map(Account::to_user);
        Ok(user)
    }
}
