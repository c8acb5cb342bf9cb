use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::album::Album;
use crate::domain::photo::{Photo, PhotoQuery};
use crate::domain::user::UserId;

/// Relational record store for albums and photos.
///
/// Row-level writes are atomic; nothing here spans the filesystem.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    async fn ping(&self) -> Result<()>;

    /// Album `album_id` if, and only if, it is owned by `user_id`.
    async fn find_album(&self, user_id: &UserId, album_id: Uuid) -> Result<Option<Album>>;

    /// Albums of one user, newest first.
    async fn list_albums(&self, user_id: &UserId) -> Result<Vec<Album>>;

    async fn insert_album(&self, album: &Album) -> Result<()>;

    /// Returns false if no row owned by `album.user_id` matched.
    async fn update_album(&self, album: &Album) -> Result<bool>;

    /// Deletes the album and, by cascade, its photo records.
    async fn delete_album(&self, user_id: &UserId, album_id: Uuid) -> Result<bool>;

    async fn insert_photo(&self, photo: &Photo) -> Result<()>;

    async fn find_photo(&self, album_id: Uuid, photo_id: Uuid) -> Result<Option<Photo>>;

    async fn count_photos(&self, album_id: Uuid) -> Result<i64>;

    /// Ordered by creation time (ties broken by id), then offset and limit.
    async fn list_photos(&self, album_id: Uuid, query: &PhotoQuery) -> Result<Vec<Photo>>;

    async fn delete_photo(&self, album_id: Uuid, photo_id: Uuid) -> Result<bool>;

    /// Deletes the photo only while its `updated_at` still equals
    /// `updated_at`. Returns false if the row is gone or was rewritten.
    async fn delete_photo_if_unchanged(
        &self,
        album_id: Uuid,
        photo_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> Result<bool>;

    /// Photos last written before `before`, ordered by id, strictly after
    /// `after` when given. Used by the reconciliation sweep.
    async fn photos_updated_before(
        &self,
        before: OffsetDateTime,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Photo>>;
}
