//! Entity stores over a generic unique-ID-keyed document collection
//!
//! Stores are intentionally "dumb": they never authorize. Authorization
//! lives in exactly one place (the ownership guard, consulted by the
//! orchestrator before any store write). Updates run as a closure under the
//! collection's write lock, so a single update-by-ID is atomic and the
//! follow-edge set mutations can check-and-modify in one critical section.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{
    Comment, CreateCommentInput, CreatePictureInput, CreateProfileInput, Picture, Profile,
    UpdateCommentInput, UpdatePictureInput, UpdateProfileInput, UserId, UserRef,
};

/// A record stored in a [`Collection`].
pub trait Document: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

impl Document for Picture {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Comment {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Profile {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Insertion-ordered, unique-ID-keyed collection.
///
/// The persistence driver is an external collaborator; this in-memory engine
/// stands in behind the same interface and provides the atomic
/// update-by-ID the concurrency model assumes (last write wins).
pub struct Collection<T> {
    rows: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            rows: self.rows.clone(),
        }
    }
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: Document> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<T> {
        self.rows.read().await.clone()
    }

    pub async fn find(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|row| pred(row))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        self.rows
            .read()
            .await
            .iter()
            .find(|row| row.id() == id)
            .cloned()
    }

    pub async fn insert(&self, row: T) -> T {
        self.rows.write().await.push(row.clone());
        row
    }

    /// Atomic read-modify-write by ID. Returns the updated record, or `None`
    /// if the ID is absent.
    pub async fn update_with(&self, id: Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut rows = self.rows.write().await;
        let row = rows.iter_mut().find(|row| row.id() == id)?;
        f(row);
        Some(row.clone())
    }

    /// Conditional atomic update: the closure may refuse the mutation, in
    /// which case the record is left untouched and the error is returned.
    pub async fn try_update_with<E>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut T) -> Result<(), E>,
    ) -> Option<Result<T, E>> {
        let mut rows = self.rows.write().await;
        let row = rows.iter_mut().find(|row| row.id() == id)?;
        Some(f(row).map(|_| row.clone()))
    }

    /// Hard removal, returning the record's last state.
    pub async fn remove(&self, id: Uuid) -> Option<T> {
        let mut rows = self.rows.write().await;
        let idx = rows.iter().position(|row| row.id() == id)?;
        Some(rows.remove(idx))
    }
}

/// Picture CRUD, scoped by ID or by owner.
#[derive(Clone, Default)]
pub struct PictureStore {
    rows: Collection<Picture>,
}

impl PictureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Picture> {
        self.rows.all().await
    }

    pub async fn get(&self, id: Uuid) -> Option<Picture> {
        self.rows.get(id).await
    }

    pub async fn by_owner(&self, owner: &UserId) -> Vec<Picture> {
        self.rows.find(|p| p.owner.id() == owner).await
    }

    /// Create a picture owned by `owner`. The owner comes from the
    /// authenticated caller; the input has no owner field to spoof.
    pub async fn create(&self, input: CreatePictureInput, owner: &UserId) -> Picture {
        self.rows
            .insert(Picture {
                id: Uuid::new_v4(),
                title: input.title,
                description: input.description,
                filename: input.filename,
                owner: UserRef::Unresolved(owner.clone()),
                created_at: Utc::now(),
            })
            .await
    }

    pub async fn update(&self, id: Uuid, input: UpdatePictureInput) -> Option<Picture> {
        self.rows.update_with(id, |p| input.apply(p)).await
    }

    pub async fn delete(&self, id: Uuid) -> Option<Picture> {
        self.rows.remove(id).await
    }
}

/// Comment CRUD, scoped by ID, owner, or parent picture.
#[derive(Clone, Default)]
pub struct CommentStore {
    rows: Collection<Comment>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Comment> {
        self.rows.all().await
    }

    pub async fn get(&self, id: Uuid) -> Option<Comment> {
        self.rows.get(id).await
    }

    pub async fn by_owner(&self, owner: &UserId) -> Vec<Comment> {
        self.rows.find(|c| c.owner.id() == owner).await
    }

    pub async fn by_picture(&self, picture: Uuid) -> Vec<Comment> {
        self.rows.find(|c| c.picture == picture).await
    }

    pub async fn create(&self, input: CreateCommentInput, owner: &UserId) -> Comment {
        self.rows
            .insert(Comment {
                id: Uuid::new_v4(),
                text: input.text,
                owner: UserRef::Unresolved(owner.clone()),
                picture: input.picture,
                created_at: Utc::now(),
            })
            .await
    }

    pub async fn update(&self, id: Uuid, input: UpdateCommentInput) -> Option<Comment> {
        self.rows.update_with(id, |c| input.apply(c)).await
    }

    pub async fn delete(&self, id: Uuid) -> Option<Comment> {
        self.rows.remove(id).await
    }
}

/// Profile CRUD plus the atomic follow-edge set mutations consumed by the
/// relationship manager.
#[derive(Clone, Default)]
pub struct ProfileStore {
    rows: Collection<Profile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Profile> {
        self.rows.all().await
    }

    pub async fn get(&self, id: Uuid) -> Option<Profile> {
        self.rows.get(id).await
    }

    /// Profiles owned by `owner`. One per owner is the intended cardinality,
    /// but it is not enforced; callers take the first match.
    pub async fn by_owner(&self, owner: &UserId) -> Vec<Profile> {
        self.rows.find(|p| p.owner.id() == owner).await
    }

    pub async fn create(&self, input: CreateProfileInput, owner: &UserId) -> Profile {
        self.rows
            .insert(Profile {
                id: Uuid::new_v4(),
                owner: UserRef::Unresolved(owner.clone()),
                avatar: input.avatar,
                cover: input.cover,
                about: input.about,
                location: input.location,
                interests: input.interests.unwrap_or_default(),
                follows: Vec::new(),
            })
            .await
    }

    pub async fn update(&self, id: Uuid, input: UpdateProfileInput) -> Option<Profile> {
        self.rows.update_with(id, |p| input.apply(p)).await
    }

    pub async fn delete(&self, id: Uuid) -> Option<Profile> {
        self.rows.remove(id).await
    }

    /// Append a follow edge, with the membership check inside the write
    /// lock. `Err(())` means the edge was already present.
    pub async fn push_follow(&self, id: Uuid, target: &UserId) -> Option<Result<Profile, ()>> {
        self.rows
            .try_update_with(id, |profile| {
                if profile.follows.contains(target) {
                    return Err(());
                }
                profile.follows.push(target.clone());
                Ok(())
            })
            .await
    }

    /// Remove a follow edge atomically. `Err(())` means the edge was absent.
    /// Removes every occurrence, so accidental duplicates are tolerated.
    pub async fn pull_follow(&self, id: Uuid, target: &UserId) -> Option<Result<Profile, ()>> {
        self.rows
            .try_update_with(id, |profile| {
                if !profile.follows.contains(target) {
                    return Err(());
                }
                profile.follows.retain(|follow| follow != target);
                Ok(())
            })
            .await
    }
}
