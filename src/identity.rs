//! Client for the external identity service
//!
//! The identity service owns User records, authentication, and token
//! validation. Every method maps 1:1 onto one of its HTTP endpoints. The
//! trait seam exists so the rest of the gateway (and its tests) never touch
//! the wire directly.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::types::{AuthPayload, Credentials, RegisterInput, UpdateUserInput, User, UserId};

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<User>;
    async fn get_users(&self) -> Result<Vec<User>>;
    /// Validate a bearer token, returning the user it belongs to.
    async fn validate_token(&self, token: &str) -> Result<User>;
    async fn login(&self, credentials: Credentials) -> Result<AuthPayload>;
    async fn register(&self, input: RegisterInput) -> Result<AuthPayload>;
    async fn update_user(&self, token: &str, input: UpdateUserInput) -> Result<AuthPayload>;
    async fn delete_user(&self, token: &str) -> Result<AuthPayload>;
    async fn update_user_as_admin(
        &self,
        token: &str,
        id: &UserId,
        input: UpdateUserInput,
    ) -> Result<AuthPayload>;
    async fn delete_user_as_admin(&self, token: &str, id: &UserId) -> Result<AuthPayload>;
}

/// Convenience alias used wherever the client is injected.
pub type SharedIdentity = Arc<dyn IdentityApi>;

/// HTTP implementation against the identity service's REST surface.
pub struct HttpIdentityClient {
    http: reqwest::Client,
    base: String,
}

impl HttpIdentityClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.identity_timeout)
            .build()
            .map_err(|e| GatewayError::Validation(format!("identity client setup: {e}")))?;
        Ok(Self {
            http,
            base: config.auth_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn read<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                GatewayError::Unavailable(format!("malformed identity response: {e}"))
            });
        }
        debug!(%status, "identity service rejected request");
        match status {
            StatusCode::NOT_FOUND => Err(GatewayError::not_found("User")),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Unauthorized),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Err(
                GatewayError::Validation(format!("identity service: {status}")),
            ),
            _ => Err(GatewayError::Unavailable(format!(
                "identity service returned {status}"
            ))),
        }
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(format!("identity service unreachable: {err}"))
}

#[async_trait]
impl IdentityApi for HttpIdentityClient {
    async fn get_user(&self, id: &UserId) -> Result<User> {
        let response = self
            .http
            .get(self.url(&format!("/users/{id}")))
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn get_users(&self) -> Result<Vec<User>> {
        let response = self
            .http
            .get(self.url("/users"))
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn validate_token(&self, token: &str) -> Result<User> {
        let response = self
            .http
            .get(self.url("/users/token"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn login(&self, credentials: Credentials) -> Result<AuthPayload> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&credentials)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn register(&self, input: RegisterInput) -> Result<AuthPayload> {
        let response = self
            .http
            .post(self.url("/users"))
            .json(&input)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn update_user(&self, token: &str, input: UpdateUserInput) -> Result<AuthPayload> {
        let response = self
            .http
            .put(self.url("/users"))
            .bearer_auth(token)
            .json(&input)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn delete_user(&self, token: &str) -> Result<AuthPayload> {
        let response = self
            .http
            .delete(self.url("/users"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn update_user_as_admin(
        &self,
        token: &str,
        id: &UserId,
        input: UpdateUserInput,
    ) -> Result<AuthPayload> {
        let response = self
            .http
            .put(self.url(&format!("/users/{id}")))
            .bearer_auth(token)
            .json(&input)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }

    async fn delete_user_as_admin(&self, token: &str, id: &UserId) -> Result<AuthPayload> {
        let response = self
            .http
            .delete(self.url(&format!("/users/{id}")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        self.read(response).await
    }
}

/// Case-insensitive substring search over user name or email. The identity
/// service exposes no search endpoint, so filtering happens gateway-side.
pub fn filter_users(users: Vec<User>, search: &str) -> Vec<User> {
    let needle = search.to_lowercase();
    users
        .into_iter()
        .filter(|user| {
            user.user_name.to_lowercase().contains(&needle)
                || user.email.to_lowercase().contains(&needle)
        })
        .collect()
}
