//! Field federation: lazy cross-entity reference resolution
//!
//! A reference field (a comment's owner, a picture's owner, a profile's
//! follow entries) is resolved only when the caller selected it. User
//! references go to the identity service through [`UserLoader`], which
//! caches resolved records for a short TTL and caps concurrent lookups so a
//! wide fan-out cannot overwhelm the identity service. Picture references on
//! comments go to the sibling picture store.
//!
//! Each resolution is independent: a missing or unreachable record fails
//! that one field, never its siblings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::{ComplexObject, Context, ErrorExtensions};
use futures::future;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::identity::SharedIdentity;
use crate::store::PictureStore;
use crate::types::{Comment, Picture, Profile, User, UserId, UserRef};

struct CacheEntry {
    user: User,
    fetched_at: Instant,
}

/// Caching, concurrency-capped loader for externally owned user records.
#[derive(Clone)]
pub struct UserLoader {
    api: SharedIdentity,
    cache: Arc<Mutex<HashMap<UserId, CacheEntry>>>,
    ttl: Duration,
    limit: Arc<Semaphore>,
}

impl UserLoader {
    pub fn new(api: SharedIdentity, ttl: Duration, concurrency: usize) -> Self {
        Self {
            api,
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            limit: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Load one user, consulting the cache first. Failures are not cached.
    pub async fn load(&self, id: &UserId) -> Result<User> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(id) {
                if entry.fetched_at.elapsed() <= self.ttl {
                    return Ok(entry.user.clone());
                }
            }
        }

        let user = {
            let _permit = self.limit.acquire().await.map_err(|_| {
                GatewayError::Unavailable("federation limiter closed".to_string())
            })?;
            self.api.get_user(id).await?
        };

        let mut cache = self.cache.lock().await;
        cache.insert(
            id.clone(),
            CacheEntry {
                user: user.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(user)
    }

    /// Load many users concurrently (bounded by the semaphore), returning
    /// whatever resolved. Partial success is the normal shape here; misses
    /// are logged and simply absent from the result.
    pub async fn load_many(&self, ids: &[UserId]) -> HashMap<UserId, User> {
        let mut resolved = HashMap::new();
        let mut pending: Vec<UserId> = Vec::new();

        {
            let cache = self.cache.lock().await;
            for id in ids {
                if resolved.contains_key(id) || pending.contains(id) {
                    continue;
                }
                match cache.get(id) {
                    Some(entry) if entry.fetched_at.elapsed() <= self.ttl => {
                        resolved.insert(id.clone(), entry.user.clone());
                    }
                    _ => pending.push(id.clone()),
                }
            }
        }

        if pending.is_empty() {
            return resolved;
        }

        let fetches = pending.into_iter().map(|id| async move {
            let _permit = self.limit.acquire().await.ok()?;
            match self.api.get_user(&id).await {
                Ok(user) => Some((id, user)),
                Err(err) => {
                    debug!(%id, error = %err, "reference resolution failed");
                    None
                }
            }
        });

        let fetched = future::join_all(fetches).await;
        let mut cache = self.cache.lock().await;
        let now = Instant::now();
        for (id, user) in fetched.into_iter().flatten() {
            cache.insert(
                id.clone(),
                CacheEntry {
                    user: user.clone(),
                    fetched_at: now,
                },
            );
            resolved.insert(id, user);
        }
        resolved
    }

    /// Transition a [`UserRef`] to its resolved state.
    pub async fn resolve(&self, reference: &UserRef) -> Result<User> {
        match reference {
            UserRef::Resolved(user) => Ok(user.clone()),
            UserRef::Unresolved(id) => self.load(id).await,
        }
    }

    /// Seed the cache with a record already in hand.
    pub async fn prime(&self, user: User) {
        self.cache.lock().await.insert(
            user.id.clone(),
            CacheEntry {
                user,
                fetched_at: Instant::now(),
            },
        );
    }
}

// Reference-field resolvers. Declared `Option` so a failed resolution nulls
// the single field and records the error without aborting sibling fields.

#[ComplexObject]
impl Picture {
    async fn owner(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<User>> {
        let loader = ctx.data::<UserLoader>()?;
        loader
            .resolve(&self.owner)
            .await
            .map(Some)
            .map_err(|e| e.extend())
    }
}

#[ComplexObject]
impl Comment {
    async fn owner(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<User>> {
        let loader = ctx.data::<UserLoader>()?;
        loader
            .resolve(&self.owner)
            .await
            .map(Some)
            .map_err(|e| e.extend())
    }

    async fn picture(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<Picture>> {
        let pictures = ctx.data::<Arc<PictureStore>>()?;
        match pictures.get(self.picture).await {
            Some(picture) => Ok(Some(picture)),
            None => Err(GatewayError::not_found("Picture").extend()),
        }
    }
}

#[ComplexObject]
impl Profile {
    async fn owner(&self, ctx: &Context<'_>) -> async_graphql::Result<Option<User>> {
        let loader = ctx.data::<UserLoader>()?;
        loader
            .resolve(&self.owner)
            .await
            .map(Some)
            .map_err(|e| e.extend())
    }

    /// Follow entries resolve independently; an unresolvable entry is a null
    /// slot, siblings are unaffected.
    async fn follows(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Option<User>>> {
        let loader = ctx.data::<UserLoader>()?;
        let resolved = loader.load_many(&self.follows).await;
        Ok(self
            .follows
            .iter()
            .map(|id| resolved.get(id).cloned())
            .collect())
    }
}
