//! Authentication context, ownership guard, and the GraphQL HTTP handler
//!
//! Provides:
//! - Bearer-token extraction and per-request caller identity injection
//! - The pure allow/deny decisions for owner-only and admin-only mutations
//! - A sliding-window rate limiter for failed login attempts

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_graphql::{ErrorExtensionValues, Request, Response, ServerError};
use axum::{extract::Extension, http::HeaderMap, Json};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::identity::SharedIdentity;
use crate::schema::GatewaySchema;
use crate::types::{Role, UserId};

/// Identity resolved from a validated bearer token.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub role: Role,
    pub token: String,
}

/// The caller identity attached to every request. Anonymous callers may run
/// read-only queries; every mutation except login/register requires
/// [`Caller::User`].
#[derive(Clone, Debug, Default)]
pub enum Caller {
    #[default]
    Anonymous,
    User(AuthenticatedUser),
}

impl Caller {
    /// The authenticated user, or `Unauthorized` for anonymous callers.
    pub fn authenticated(&self) -> Result<&AuthenticatedUser> {
        match self {
            Self::Anonymous => Err(GatewayError::Unauthorized),
            Self::User(user) => Ok(user),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

/// Owner-only gate: the caller must be authenticated and its identifier must
/// equal the record's owner by normalized value. Pure decision, no side
/// effects.
pub fn authorize_owner(caller: &Caller, owner: &UserId) -> Result<()> {
    let user = caller.authenticated()?;
    if &user.id == owner {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized)
    }
}

/// Admin-only gate.
pub fn authorize_admin(caller: &Caller) -> Result<&AuthenticatedUser> {
    let user = caller.authenticated()?;
    if user.role == Role::Admin {
        Ok(user)
    } else {
        Err(GatewayError::Unauthorized)
    }
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// GraphQL handler with caller-identity injection.
///
/// The bearer token (if any) is validated once per request against the
/// identity service. A valid token yields [`Caller::User`]; a rejected token
/// downgrades to [`Caller::Anonymous`]. If the identity service cannot be
/// reached while a token is present, the request fails `UNAVAILABLE` rather
/// than misreporting an infrastructure fault as an authorization problem.
pub async fn graphql_handler(
    Extension(schema): Extension<GatewaySchema>,
    Extension(identity): Extension<SharedIdentity>,
    headers: HeaderMap,
    req: Json<Request>,
) -> Json<Response> {
    let caller = match bearer_token(&headers) {
        None => Caller::Anonymous,
        Some(token) => match identity.validate_token(&token).await {
            Ok(user) => Caller::User(AuthenticatedUser {
                id: user.id,
                role: user.role,
                token,
            }),
            Err(err @ GatewayError::Unavailable(_)) => {
                return Json(unavailable_response(&err));
            }
            Err(err) => {
                debug!(error = %err, "token rejected, downgrading to anonymous");
                Caller::Anonymous
            }
        },
    };

    let request = req.0.data(caller);
    Json(schema.execute(request).await)
}

fn unavailable_response(err: &GatewayError) -> Response {
    let mut extensions = ErrorExtensionValues::default();
    extensions.set("code", err.code());
    let mut server_error = ServerError::new(err.to_string(), None);
    server_error.extensions = Some(extensions);
    Response::from_errors(vec![server_error])
}

/// Sliding-window limiter for failed login attempts, keyed by username.
///
/// Once more than `max_attempts` failures land inside `window`, further
/// logins for that username fail `RateLimited` regardless of credential
/// correctness, until the window drains.
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_attempts: u32,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Gate a login attempt before credentials are checked.
    pub async fn check(&self, username: &str) -> Result<()> {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        if let Some(failures) = attempts.get_mut(username) {
            Self::prune(failures, now, self.window);
            if failures.len() >= self.max_attempts as usize {
                return Err(GatewayError::RateLimited);
            }
        }
        Ok(())
    }

    pub async fn record_failure(&self, username: &str) {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        let failures = attempts.entry(username.to_string()).or_default();
        Self::prune(failures, now, self.window);
        failures.push_back(now);
    }

    /// A successful login clears the username's window.
    pub async fn clear(&self, username: &str) {
        self.attempts.lock().await.remove(username);
    }

    fn prune(failures: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = failures.front() {
            if now.duration_since(*oldest) > window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }
}
