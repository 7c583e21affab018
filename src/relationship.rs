//! Follow-graph relationship manager
//!
//! Maintains the directed follow edges embedded in Profile records. The
//! acting profile is located by the caller's owner identity (the caller only
//! supplies the target), and each edge mutation is a single atomic
//! set-mutation at the store layer. Repeating a call after success yields
//! `AlreadyFollowing`/`NotFollowing`, never a silent no-op.
//!
//! Self-follow is allowed; nothing in the contract forbids it.

use std::sync::Arc;

use tracing::info;

use crate::auth::{authorize_owner, Caller};
use crate::error::{GatewayError, Result};
use crate::store::ProfileStore;
use crate::types::{Owned, Profile, UserId};

#[derive(Clone)]
pub struct FollowManager {
    profiles: Arc<ProfileStore>,
}

impl FollowManager {
    pub fn new(profiles: Arc<ProfileStore>) -> Self {
        Self { profiles }
    }

    async fn acting_profile(&self, caller: &Caller) -> Result<Profile> {
        let user = caller.authenticated()?;
        let profile = self
            .profiles
            .by_owner(&user.id)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found("Profile"))?;
        authorize_owner(caller, profile.owner_id())?;
        Ok(profile)
    }

    /// Append `target` to the caller's follows set.
    pub async fn add_follow(&self, caller: &Caller, target: UserId) -> Result<Profile> {
        let profile = self.acting_profile(caller).await?;
        let updated = self
            .profiles
            .push_follow(profile.id, &target)
            .await
            .ok_or_else(|| GatewayError::not_found("Profile"))?
            .map_err(|()| GatewayError::AlreadyFollowing)?;
        info!(profile = %profile.id, %target, "follow added");
        Ok(updated)
    }

    /// Remove `target` from the caller's follows set.
    pub async fn remove_follow(&self, caller: &Caller, target: UserId) -> Result<Profile> {
        let profile = self.acting_profile(caller).await?;
        let updated = self
            .profiles
            .pull_follow(profile.id, &target)
            .await
            .ok_or_else(|| GatewayError::not_found("Profile"))?
            .map_err(|()| GatewayError::NotFollowing)?;
        info!(profile = %profile.id, %target, "follow removed");
        Ok(updated)
    }
}
