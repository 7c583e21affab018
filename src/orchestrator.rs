//! Mutation orchestrator
//!
//! One control flow for every local-entity mutation:
//! authenticate → load target (update/delete) → ownership guard → write →
//! best-effort fanout → return the written/deleted record. A failure at any
//! step is terminal; retries are the caller's responsibility. Create skips
//! the load step and stamps the owner from the authenticated identity, never
//! from client-supplied fields.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::auth::{authorize_owner, Caller};
use crate::error::{GatewayError, Result};
use crate::fanout::{Fanout, Topic};
use crate::relationship::FollowManager;
use crate::store::{CommentStore, PictureStore, ProfileStore};
use crate::types::{
    Comment, CreateCommentInput, CreatePictureInput, CreateProfileInput, Owned, Picture, Profile,
    UpdateCommentInput, UpdatePictureInput, UpdateProfileInput, UserId,
};

pub struct Orchestrator {
    pictures: Arc<PictureStore>,
    comments: Arc<CommentStore>,
    profiles: Arc<ProfileStore>,
    follows: FollowManager,
    fanout: Fanout,
}

/// Steps 2-3 of the state machine: resolve the loaded record and run the
/// ownership guard against it, before any write happens.
fn guard_target<T: Owned>(caller: &Caller, record: Option<T>, what: &str) -> Result<T> {
    let record = record.ok_or_else(|| GatewayError::not_found(what))?;
    authorize_owner(caller, record.owner_id())?;
    Ok(record)
}

impl Orchestrator {
    pub fn new(
        pictures: Arc<PictureStore>,
        comments: Arc<CommentStore>,
        profiles: Arc<ProfileStore>,
        fanout: Fanout,
    ) -> Self {
        Self {
            pictures,
            comments,
            follows: FollowManager::new(profiles.clone()),
            profiles,
            fanout,
        }
    }

    // --- pictures -----------------------------------------------------------

    pub async fn create_picture(
        &self,
        caller: &Caller,
        input: CreatePictureInput,
    ) -> Result<Picture> {
        let user = caller.authenticated()?;
        let picture = self.pictures.create(input, &user.id).await;
        info!(id = %picture.id, owner = %user.id, "picture created");
        self.fanout.notify(Topic::Pictures);
        Ok(picture)
    }

    pub async fn update_picture(
        &self,
        caller: &Caller,
        id: Uuid,
        input: UpdatePictureInput,
    ) -> Result<Picture> {
        caller.authenticated()?;
        guard_target(caller, self.pictures.get(id).await, "Picture")?;
        let updated = self
            .pictures
            .update(id, input)
            .await
            .ok_or_else(|| GatewayError::not_found("Picture"))?;
        info!(%id, "picture updated");
        self.fanout.notify(Topic::Pictures);
        Ok(updated)
    }

    pub async fn delete_picture(&self, caller: &Caller, id: Uuid) -> Result<Picture> {
        caller.authenticated()?;
        guard_target(caller, self.pictures.get(id).await, "Picture")?;
        let deleted = self
            .pictures
            .delete(id)
            .await
            .ok_or_else(|| GatewayError::not_found("Picture"))?;
        info!(%id, "picture deleted");
        self.fanout.notify(Topic::Pictures);
        Ok(deleted)
    }

    // --- comments -----------------------------------------------------------

    pub async fn create_comment(
        &self,
        caller: &Caller,
        input: CreateCommentInput,
    ) -> Result<Comment> {
        let user = caller.authenticated()?;
        // the parent picture must exist at creation time
        if self.pictures.get(input.picture).await.is_none() {
            return Err(GatewayError::not_found("Picture"));
        }
        let comment = self.comments.create(input, &user.id).await;
        info!(id = %comment.id, owner = %user.id, "comment created");
        self.fanout.notify(Topic::Comments);
        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        caller: &Caller,
        id: Uuid,
        input: UpdateCommentInput,
    ) -> Result<Comment> {
        caller.authenticated()?;
        guard_target(caller, self.comments.get(id).await, "Comment")?;
        let updated = self
            .comments
            .update(id, input)
            .await
            .ok_or_else(|| GatewayError::not_found("Comment"))?;
        info!(%id, "comment updated");
        self.fanout.notify(Topic::Comments);
        Ok(updated)
    }

    pub async fn delete_comment(&self, caller: &Caller, id: Uuid) -> Result<Comment> {
        caller.authenticated()?;
        guard_target(caller, self.comments.get(id).await, "Comment")?;
        let deleted = self
            .comments
            .delete(id)
            .await
            .ok_or_else(|| GatewayError::not_found("Comment"))?;
        info!(%id, "comment deleted");
        self.fanout.notify(Topic::Comments);
        Ok(deleted)
    }

    // --- profiles -----------------------------------------------------------

    pub async fn create_profile(
        &self,
        caller: &Caller,
        input: CreateProfileInput,
    ) -> Result<Profile> {
        let user = caller.authenticated()?;
        let profile = self.profiles.create(input, &user.id).await;
        info!(id = %profile.id, owner = %user.id, "profile created");
        self.fanout.notify(Topic::Profiles);
        Ok(profile)
    }

    pub async fn update_profile(
        &self,
        caller: &Caller,
        id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<Profile> {
        caller.authenticated()?;
        guard_target(caller, self.profiles.get(id).await, "Profile")?;
        let updated = self
            .profiles
            .update(id, input)
            .await
            .ok_or_else(|| GatewayError::not_found("Profile"))?;
        info!(%id, "profile updated");
        self.fanout.notify(Topic::Profiles);
        Ok(updated)
    }

    pub async fn delete_profile(&self, caller: &Caller, id: Uuid) -> Result<Profile> {
        caller.authenticated()?;
        guard_target(caller, self.profiles.get(id).await, "Profile")?;
        let deleted = self
            .profiles
            .delete(id)
            .await
            .ok_or_else(|| GatewayError::not_found("Profile"))?;
        info!(%id, "profile deleted");
        self.fanout.notify(Topic::Profiles);
        Ok(deleted)
    }

    // --- follow graph ---------------------------------------------------------

    pub async fn add_follow(&self, caller: &Caller, target: UserId) -> Result<Profile> {
        let profile = self.follows.add_follow(caller, target).await?;
        self.fanout.notify(Topic::Profiles);
        Ok(profile)
    }

    pub async fn remove_follow(&self, caller: &Caller, target: UserId) -> Result<Profile> {
        let profile = self.follows.remove_follow(caller, target).await?;
        self.fanout.notify(Topic::Profiles);
        Ok(profile)
    }
}
