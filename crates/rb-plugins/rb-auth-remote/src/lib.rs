//! # rb-auth-remote
//!
//! `AuthProvider` backed by the external auth service over HTTP.
//!
//! - `GET  {base}/api/v1/users/{id}`: 404 means the user does not exist
//! - `POST {base}/api/v1/auth/validate` with `{"token": ...}`: 401/404 mean invalid
//!
//! Both accept the user either bare or wrapped as `{"user": {...}}`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rb_core::models::User;
use rb_core::traits::AuthProvider;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Deserialize)]
#[serde(untagged)]
enum UserBody {
    Wrapped { user: User },
    Bare(User),
}

impl From<UserBody> for User {
    fn from(body: UserBody) -> Self {
        match body {
            UserBody::Wrapped { user } | UserBody::Bare(user) => user,
        }
    }
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

pub struct RemoteAuthProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl RemoteAuthProvider {
    /// `timeout` bounds every request end to end.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build auth HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key.expose_secret()),
            None => request,
        }
    }

    /// Maps the response to a user, `None` for any of the `absent` statuses.
    async fn read_user(response: Response, absent: &[StatusCode]) -> anyhow::Result<Option<User>> {
        let status = response.status();
        if absent.contains(&status) {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body, "auth service returned an error");
            anyhow::bail!("auth service responded with {status}");
        }

        let body: UserBody = response.json().await.context("malformed user payload from auth service")?;
        Ok(Some(body.into()))
    }
}

#[async_trait]
impl AuthProvider for RemoteAuthProvider {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        let url = format!("{}/api/v1/users/{id}", self.base_url);
        debug!(user_id = id, "looking up user");

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Self::read_user(response, &[StatusCode::NOT_FOUND]).await
    }

    async fn validate_token(&self, token: &str) -> anyhow::Result<Option<User>> {
        let url = format!("{}/api/v1/auth/validate", self.base_url);

        let response = self
            .authorized(self.client.post(&url))
            .json(&ValidateRequest { token })
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        Self::read_user(response, &[StatusCode::UNAUTHORIZED, StatusCode::NOT_FOUND]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_err;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: Option<&str>) -> RemoteAuthProvider {
        RemoteAuthProvider::new(server.uri(), key.map(|k| SecretString::from(k.to_string())), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_get_user_accepts_wrapped_body_and_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/users/7"))
            .and(header("x-api-key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 7, "username": "alice", "role": "user", "is_banned": true}
            })))
            .mount(&server)
            .await;

        let user = provider(&server, Some("k1")).get_user(7).await.unwrap().expect("user");
        assert_eq!(user.username, "alice");
        assert!(user.banned);
    }

    #[tokio::test]
    async fn test_get_user_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(provider(&server, None).get_user(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_token_bare_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/validate"))
            .and(body_json(json!({"token": "t0k"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 3, "username": "mod", "role": "moderator", "banned": false
            })))
            .mount(&server)
            .await;

        let user = provider(&server, None).validate_token("t0k").await.unwrap().expect("user");
        assert!(user.is_moderator());
    }

    #[tokio::test]
    async fn test_rejected_token_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(provider(&server, None).validate_token("bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        assert_err!(provider(&server, None).get_user(1).await);
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let auth = RemoteAuthProvider::new(server.uri(), None, Duration::from_millis(50)).unwrap();
        assert_err!(auth.get_user(1).await);
    }
}
