//! # gallery-gateway
//!
//! Federation gateway presenting a single GraphQL surface over three locally
//! owned entity collections (pictures, comments, profiles) and the
//! externally owned User entity, reachable only through the identity
//! service.
//!
//! ## Features
//!
//! - **Field Federation** - lazy, per-field resolution of cross-entity
//!   references, with a TTL cache and bounded concurrent identity lookups
//! - **Ownership Guard** - owner-only mutation rights enforced in one place
//!   across all three entity types
//! - **Follow Graph** - bidirectional follow relationships with atomic,
//!   conflict-reporting add/remove semantics
//! - **Notification Fanout** - at-most-once, best-effort topic-changed
//!   events after each successful mutation
//! - **Auth Middleware** - bearer-token validation and caller-identity
//!   injection for the GraphQL handler

pub mod auth;
pub mod config;
pub mod error;
pub mod fanout;
pub mod federation;
pub mod identity;
pub mod orchestrator;
pub mod relationship;
pub mod schema;
pub mod store;
pub mod types;

pub use auth::{authorize_admin, authorize_owner, graphql_handler, Caller, LoginRateLimiter};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use fanout::{Fanout, Topic};
pub use federation::UserLoader;
pub use identity::{HttpIdentityClient, IdentityApi, SharedIdentity};
pub use orchestrator::Orchestrator;
pub use relationship::FollowManager;
pub use schema::{build_schema, GatewaySchema, MutationRoot, QueryRoot};
pub use store::{CommentStore, PictureStore, ProfileStore};
pub use types::{Comment, Picture, Profile, Role, User, UserId, UserRef};
