//! Domain types for the gateway
//!
//! Locally owned entities (Picture, Comment, Profile) carry a [`UserRef`] to
//! the externally owned User; resolution of that reference is an explicit
//! state transition performed by the field federator, never an implicit
//! coercion.

use async_graphql::{InputObject, InputValueError, InputValueResult, Scalar, ScalarType, SimpleObject, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a user owned by the external identity service.
///
/// The identity service's IDs are opaque strings; the same ID can arrive in
/// different representations, so the value is normalized (trimmed,
/// lowercased) at construction and all comparisons are by normalized value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UserId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[Scalar]
impl ScalarType for UserId {
    fn parse(value: Value) -> InputValueResult<Self> {
        if let Value::String(s) = value {
            Ok(UserId::new(s))
        } else {
            Err(InputValueError::expected_type(value))
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

/// Role assigned by the identity service.
#[derive(async_graphql::Enum, Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

/// A user record owned by the external identity service. The gateway never
/// writes this entity; it only reads it by ID or validates a token against it.
#[derive(SimpleObject, Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// A reference to a User that is either still an identifier or has been
/// resolved against the identity service.
#[derive(Clone, Debug, PartialEq)]
pub enum UserRef {
    Unresolved(UserId),
    Resolved(User),
}

impl UserRef {
    /// The referenced identifier, available in both states.
    pub fn id(&self) -> &UserId {
        match self {
            Self::Unresolved(id) => id,
            Self::Resolved(user) => &user.id,
        }
    }

    pub fn resolved(&self) -> Option<&User> {
        match self {
            Self::Unresolved(_) => None,
            Self::Resolved(user) => Some(user),
        }
    }
}

/// Records with an immutable owner stamped at creation time.
pub trait Owned {
    fn owner_id(&self) -> &UserId;
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct Picture {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Opaque reference to externally stored binary content.
    pub filename: String,
    #[graphql(skip)]
    pub owner: UserRef,
    pub created_at: DateTime<Utc>,
}

impl Owned for Picture {
    fn owner_id(&self) -> &UserId {
        self.owner.id()
    }
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct Comment {
    pub id: Uuid,
    pub text: String,
    #[graphql(skip)]
    pub owner: UserRef,
    /// Parent picture. Must exist at creation time; a later dangling
    /// reference surfaces as a resolution failure on this field only.
    #[graphql(skip)]
    pub picture: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Owned for Comment {
    fn owner_id(&self) -> &UserId {
        self.owner.id()
    }
}

#[derive(SimpleObject, Clone, Debug, PartialEq)]
#[graphql(complex)]
pub struct Profile {
    pub id: Uuid,
    #[graphql(skip)]
    pub owner: UserRef,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    /// Ordered free-text interests; duplicates allowed.
    pub interests: Vec<String>,
    /// Outbound follow edges. Semantically a set of normalized user IDs.
    #[graphql(skip)]
    pub follows: Vec<UserId>,
}

impl Owned for Profile {
    fn owner_id(&self) -> &UserId {
        self.owner.id()
    }
}

// --- mutation inputs -------------------------------------------------------
//
// None of these carries an owner field: the owner is always stamped from the
// authenticated caller, never from client-supplied input.

#[derive(InputObject, Clone, Debug)]
pub struct CreatePictureInput {
    pub title: String,
    pub description: String,
    pub filename: String,
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct UpdatePictureInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub filename: Option<String>,
}

impl UpdatePictureInput {
    /// Partial merge: only supplied fields change.
    pub fn apply(&self, picture: &mut Picture) {
        if let Some(title) = &self.title {
            picture.title = title.clone();
        }
        if let Some(description) = &self.description {
            picture.description = description.clone();
        }
        if let Some(filename) = &self.filename {
            picture.filename = filename.clone();
        }
    }
}

#[derive(InputObject, Clone, Debug)]
pub struct CreateCommentInput {
    pub text: String,
    pub picture: Uuid,
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct UpdateCommentInput {
    pub text: Option<String>,
}

impl UpdateCommentInput {
    pub fn apply(&self, comment: &mut Comment) {
        if let Some(text) = &self.text {
            comment.text = text.clone();
        }
    }
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct CreateProfileInput {
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub interests: Option<Vec<String>>,
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct UpdateProfileInput {
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub interests: Option<Vec<String>>,
}

impl UpdateProfileInput {
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(avatar) = &self.avatar {
            profile.avatar = Some(avatar.clone());
        }
        if let Some(cover) = &self.cover {
            profile.cover = Some(cover.clone());
        }
        if let Some(about) = &self.about {
            profile.about = Some(about.clone());
        }
        if let Some(location) = &self.location {
            profile.location = Some(location.clone());
        }
        if let Some(interests) = &self.interests {
            profile.interests = interests.clone();
        }
    }
}

// --- identity service wire types -------------------------------------------

#[derive(InputObject, Clone, Debug, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(InputObject, Clone, Debug, Serialize)]
pub struct RegisterInput {
    pub user_name: String,
    pub email: String,
    pub password: String,
}

#[derive(InputObject, Clone, Debug, Default, Serialize)]
pub struct UpdateUserInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Response shape of the identity service's login/register/update/delete
/// endpoints.
#[derive(SimpleObject, Clone, Debug, Deserialize)]
pub struct AuthPayload {
    pub token: Option<String>,
    pub message: String,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_compares_by_normalized_value() {
        assert_eq!(UserId::new("  ABC123 "), UserId::new("abc123"));
        assert_ne!(UserId::new("abc123"), UserId::new("abc124"));
    }

    #[test]
    fn user_id_scalar_roundtrip() {
        let parsed = <UserId as ScalarType>::parse(Value::String("Abc".into())).unwrap();
        assert_eq!(parsed, UserId::new("abc"));
        assert_eq!(parsed.to_value(), Value::String("abc".into()));
        assert!(<UserId as ScalarType>::parse(Value::Number(1.into())).is_err());
    }

    #[test]
    fn role_defaults_to_member_when_absent() {
        let user: User =
            serde_json::from_str(r#"{"id":"U1","user_name":"n","email":"e@x"}"#).unwrap();
        assert_eq!(user.role, Role::Member);
        let admin: User =
            serde_json::from_str(r#"{"id":"U1","user_name":"n","email":"e@x","role":"admin"}"#)
                .unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[test]
    fn update_picture_is_a_partial_merge() {
        let mut picture = Picture {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: "d".into(),
            filename: "f.jpg".into(),
            owner: UserRef::Unresolved(UserId::new("u1")),
            created_at: Utc::now(),
        };
        UpdatePictureInput {
            title: Some("x".into()),
            ..Default::default()
        }
        .apply(&mut picture);
        assert_eq!(picture.title, "x");
        assert_eq!(picture.description, "d");
        assert_eq!(picture.filename, "f.jpg");
    }

    #[test]
    fn user_ref_exposes_id_in_both_states() {
        let id = UserId::new("u1");
        let unresolved = UserRef::Unresolved(id.clone());
        assert_eq!(unresolved.id(), &id);
        assert!(unresolved.resolved().is_none());

        let resolved = UserRef::Resolved(User {
            id: id.clone(),
            user_name: "n".into(),
            email: "e@x".into(),
            role: Role::Member,
        });
        assert_eq!(resolved.id(), &id);
        assert!(resolved.resolved().is_some());
    }
}
