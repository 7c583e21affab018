//! GraphQL operation surface
//!
//! Queries read straight from the entity stores or the identity client;
//! reference fields on the returned records are resolved lazily by the field
//! federator. Mutations on local entities run through the orchestrator; user
//! mutations proxy the identity service (no local write, no fanout).

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, ErrorExtensions, Object, Result as GqlResult, Schema};
use uuid::Uuid;

use crate::auth::{authorize_admin, Caller, LoginRateLimiter};
use crate::config::Config;
use crate::error::GatewayError;
use crate::fanout::Fanout;
use crate::federation::UserLoader;
use crate::identity::{filter_users, SharedIdentity};
use crate::orchestrator::Orchestrator;
use crate::store::{CommentStore, PictureStore, ProfileStore};
use crate::types::{
    AuthPayload, Comment, CreateCommentInput, CreatePictureInput, CreateProfileInput, Credentials,
    Picture, Profile, RegisterInput, UpdateCommentInput, UpdatePictureInput, UpdateProfileInput,
    UpdateUserInput, User, UserId,
};

pub type GatewaySchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Wire up stores, loader, limiter, and orchestrator into an executable
/// schema. The fanout channel is created by the caller at startup and
/// injected here.
pub fn build_schema(identity: SharedIdentity, fanout: Fanout, config: &Config) -> GatewaySchema {
    let pictures = Arc::new(PictureStore::new());
    let comments = Arc::new(CommentStore::new());
    let profiles = Arc::new(ProfileStore::new());
    let loader = UserLoader::new(
        identity.clone(),
        config.federation_cache_ttl,
        config.federation_concurrency,
    );
    let limiter = Arc::new(LoginRateLimiter::new(
        config.login_max_attempts,
        config.login_window,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        pictures.clone(),
        comments.clone(),
        profiles.clone(),
        fanout,
    ));

    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(identity)
        .data(loader)
        .data(limiter)
        .data(orchestrator)
        .data(pictures)
        .data(comments)
        .data(profiles)
        .finish()
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    // --- users (external) ---------------------------------------------------

    async fn users(&self, ctx: &Context<'_>) -> GqlResult<Vec<User>> {
        let identity = ctx.data::<SharedIdentity>()?;
        identity.get_users().await.map_err(|e| e.extend())
    }

    async fn user_by_id(&self, ctx: &Context<'_>, id: UserId) -> GqlResult<User> {
        let identity = ctx.data::<SharedIdentity>()?;
        identity.get_user(&id).await.map_err(|e| e.extend())
    }

    /// Validate the caller's bearer token and return its user.
    async fn check_token(&self, ctx: &Context<'_>) -> GqlResult<User> {
        let user = ctx.data::<Caller>()?.authenticated().map_err(|e| e.extend())?;
        let identity = ctx.data::<SharedIdentity>()?;
        identity
            .validate_token(&user.token)
            .await
            .map_err(|e| e.extend())
    }

    async fn search_users(&self, ctx: &Context<'_>, search: String) -> GqlResult<Vec<User>> {
        let identity = ctx.data::<SharedIdentity>()?;
        let users = identity.get_users().await.map_err(|e| e.extend())?;
        Ok(filter_users(users, &search))
    }

    // --- pictures -------------------------------------------------------------

    async fn pictures(&self, ctx: &Context<'_>) -> GqlResult<Vec<Picture>> {
        Ok(ctx.data::<Arc<PictureStore>>()?.all().await)
    }

    async fn picture_by_id(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Option<Picture>> {
        Ok(ctx.data::<Arc<PictureStore>>()?.get(id).await)
    }

    async fn pictures_by_owner(&self, ctx: &Context<'_>, owner: UserId) -> GqlResult<Vec<Picture>> {
        Ok(ctx.data::<Arc<PictureStore>>()?.by_owner(&owner).await)
    }

    // --- comments -------------------------------------------------------------

    async fn comments(&self, ctx: &Context<'_>) -> GqlResult<Vec<Comment>> {
        Ok(ctx.data::<Arc<CommentStore>>()?.all().await)
    }

    async fn comment_by_id(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Option<Comment>> {
        Ok(ctx.data::<Arc<CommentStore>>()?.get(id).await)
    }

    async fn comments_by_picture(
        &self,
        ctx: &Context<'_>,
        picture_id: Uuid,
    ) -> GqlResult<Vec<Comment>> {
        Ok(ctx.data::<Arc<CommentStore>>()?.by_picture(picture_id).await)
    }

    async fn comments_by_owner(
        &self,
        ctx: &Context<'_>,
        owner_id: UserId,
    ) -> GqlResult<Vec<Comment>> {
        Ok(ctx.data::<Arc<CommentStore>>()?.by_owner(&owner_id).await)
    }

    // --- profiles -------------------------------------------------------------

    async fn profiles(&self, ctx: &Context<'_>) -> GqlResult<Vec<Profile>> {
        Ok(ctx.data::<Arc<ProfileStore>>()?.all().await)
    }

    async fn profile_by_id(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Option<Profile>> {
        Ok(ctx.data::<Arc<ProfileStore>>()?.get(id).await)
    }

    /// Profiles owned by a user. One per owner is the intended cardinality
    /// but is not enforced, so this returns a list.
    async fn profile_by_owner(&self, ctx: &Context<'_>, owner: UserId) -> GqlResult<Vec<Profile>> {
        Ok(ctx.data::<Arc<ProfileStore>>()?.by_owner(&owner).await)
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    // --- auth (proxied to the identity service) --------------------------------

    async fn login(&self, ctx: &Context<'_>, credentials: Credentials) -> GqlResult<AuthPayload> {
        let limiter = ctx.data::<Arc<LoginRateLimiter>>()?;
        let identity = ctx.data::<SharedIdentity>()?;

        // the limiter gates before credentials are even checked, so a tripped
        // window rejects correct credentials too
        limiter
            .check(&credentials.username)
            .await
            .map_err(|e| e.extend())?;

        let username = credentials.username.clone();
        match identity.login(credentials).await {
            Ok(payload) => {
                limiter.clear(&username).await;
                Ok(payload)
            }
            Err(err @ (GatewayError::Unauthorized | GatewayError::NotFound(_))) => {
                limiter.record_failure(&username).await;
                Err(err.extend())
            }
            Err(err) => Err(err.extend()),
        }
    }

    async fn register(&self, ctx: &Context<'_>, user: RegisterInput) -> GqlResult<AuthPayload> {
        let identity = ctx.data::<SharedIdentity>()?;
        identity.register(user).await.map_err(|e| e.extend())
    }

    async fn update_user(&self, ctx: &Context<'_>, user: UpdateUserInput) -> GqlResult<AuthPayload> {
        let caller = ctx.data::<Caller>()?.authenticated().map_err(|e| e.extend())?;
        let identity = ctx.data::<SharedIdentity>()?;
        identity
            .update_user(&caller.token, user)
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_user(&self, ctx: &Context<'_>) -> GqlResult<AuthPayload> {
        let caller = ctx.data::<Caller>()?.authenticated().map_err(|e| e.extend())?;
        let identity = ctx.data::<SharedIdentity>()?;
        identity
            .delete_user(&caller.token)
            .await
            .map_err(|e| e.extend())
    }

    async fn update_user_as_admin(
        &self,
        ctx: &Context<'_>,
        id: UserId,
        user: UpdateUserInput,
    ) -> GqlResult<AuthPayload> {
        let admin = authorize_admin(ctx.data::<Caller>()?).map_err(|e| e.extend())?;
        let identity = ctx.data::<SharedIdentity>()?;
        identity
            .update_user_as_admin(&admin.token, &id, user)
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_user_as_admin(&self, ctx: &Context<'_>, id: UserId) -> GqlResult<AuthPayload> {
        let admin = authorize_admin(ctx.data::<Caller>()?).map_err(|e| e.extend())?;
        let identity = ctx.data::<SharedIdentity>()?;
        identity
            .delete_user_as_admin(&admin.token, &id)
            .await
            .map_err(|e| e.extend())
    }

    // --- pictures ---------------------------------------------------------------

    async fn create_picture(
        &self,
        ctx: &Context<'_>,
        input: CreatePictureInput,
    ) -> GqlResult<Picture> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .create_picture(ctx.data::<Caller>()?, input)
            .await
            .map_err(|e| e.extend())
    }

    async fn update_picture(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UpdatePictureInput,
    ) -> GqlResult<Picture> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .update_picture(ctx.data::<Caller>()?, id, input)
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_picture(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Picture> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .delete_picture(ctx.data::<Caller>()?, id)
            .await
            .map_err(|e| e.extend())
    }

    // --- comments ---------------------------------------------------------------

    async fn create_comment(
        &self,
        ctx: &Context<'_>,
        input: CreateCommentInput,
    ) -> GqlResult<Comment> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .create_comment(ctx.data::<Caller>()?, input)
            .await
            .map_err(|e| e.extend())
    }

    async fn update_comment(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UpdateCommentInput,
    ) -> GqlResult<Comment> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .update_comment(ctx.data::<Caller>()?, id, input)
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_comment(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Comment> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .delete_comment(ctx.data::<Caller>()?, id)
            .await
            .map_err(|e| e.extend())
    }

    // --- profiles ---------------------------------------------------------------

    async fn create_profile(
        &self,
        ctx: &Context<'_>,
        input: CreateProfileInput,
    ) -> GqlResult<Profile> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .create_profile(ctx.data::<Caller>()?, input)
            .await
            .map_err(|e| e.extend())
    }

    async fn update_profile(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        input: UpdateProfileInput,
    ) -> GqlResult<Profile> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .update_profile(ctx.data::<Caller>()?, id, input)
            .await
            .map_err(|e| e.extend())
    }

    async fn delete_profile(&self, ctx: &Context<'_>, id: Uuid) -> GqlResult<Profile> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .delete_profile(ctx.data::<Caller>()?, id)
            .await
            .map_err(|e| e.extend())
    }

    // --- follow graph -------------------------------------------------------------

    async fn add_follow(&self, ctx: &Context<'_>, id: UserId) -> GqlResult<Profile> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .add_follow(ctx.data::<Caller>()?, id)
            .await
            .map_err(|e| e.extend())
    }

    async fn remove_follow(&self, ctx: &Context<'_>, id: UserId) -> GqlResult<Profile> {
        let orchestrator = ctx.data::<Arc<Orchestrator>>()?;
        orchestrator
            .remove_follow(ctx.data::<Caller>()?, id)
            .await
            .map_err(|e| e.extend())
    }
}
