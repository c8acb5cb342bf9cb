use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::album::Album;
use crate::domain::photo::{Photo, PhotoQuery, SortOrder};
use crate::domain::user::UserId;
use crate::infra::catalog::Catalog;

/// In-process catalog with the same semantics as the Postgres one, including
/// the album → photo cascade. Used for tests and `CATALOG=memory` runs.
#[derive(Default)]
pub struct MemoryCatalog {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    albums: HashMap<Uuid, Album>,
    photos: HashMap<Uuid, Photo>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_album(&self, user_id: &UserId, album_id: Uuid) -> Result<Option<Album>> {
        let state = self.state.read().await;
        Ok(state
            .albums
            .get(&album_id)
            .filter(|album| &album.user_id == user_id)
            .cloned())
    }

    async fn list_albums(&self, user_id: &UserId) -> Result<Vec<Album>> {
        let state = self.state.read().await;
        let mut albums: Vec<Album> = state
            .albums
            .values()
            .filter(|album| &album.user_id == user_id)
            .cloned()
            .collect();
        albums.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(albums)
    }

    async fn insert_album(&self, album: &Album) -> Result<()> {
        let mut state = self.state.write().await;
        if state.albums.contains_key(&album.id) {
            return Err(anyhow!("duplicate album id {}", album.id));
        }
        state.albums.insert(album.id, album.clone());
        Ok(())
    }

    async fn update_album(&self, album: &Album) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.albums.get_mut(&album.id) {
            Some(existing) if existing.user_id == album.user_id => {
                existing.title = album.title.clone();
                existing.description = album.description.clone();
                existing.cover_image = album.cover_image.clone();
                existing.updated_at = album.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_album(&self, user_id: &UserId, album_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let owned = state
            .albums
            .get(&album_id)
            .map_or(false, |album| &album.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        state.albums.remove(&album_id);
        state.photos.retain(|_, photo| photo.album_id != album_id);
        Ok(true)
    }

    async fn insert_photo(&self, photo: &Photo) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.albums.contains_key(&photo.album_id) {
            return Err(anyhow!("album {} does not exist", photo.album_id));
        }
        if state.photos.contains_key(&photo.id) {
            return Err(anyhow!("duplicate photo id {}", photo.id));
        }
        state.photos.insert(photo.id, photo.clone());
        Ok(())
    }

    async fn find_photo(&self, album_id: Uuid, photo_id: Uuid) -> Result<Option<Photo>> {
        let state = self.state.read().await;
        Ok(state
            .photos
            .get(&photo_id)
            .filter(|photo| photo.album_id == album_id)
            .cloned())
    }

    async fn count_photos(&self, album_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        let total = state
            .photos
            .values()
            .filter(|photo| photo.album_id == album_id)
            .count();
        Ok(total as i64)
    }

    async fn list_photos(&self, album_id: Uuid, query: &PhotoQuery) -> Result<Vec<Photo>> {
        let state = self.state.read().await;
        let mut photos: Vec<Photo> = state
            .photos
            .values()
            .filter(|photo| photo.album_id == album_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if query.order == SortOrder::Desc {
            photos.reverse();
        }

        let offset = usize::try_from(query.effective_offset()).unwrap_or(usize::MAX);
        let iter = photos.into_iter().skip(offset);
        Ok(match query.effective_limit() {
            Some(limit) => iter
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => iter.collect(),
        })
    }

    async fn delete_photo(&self, album_id: Uuid, photo_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let matches = state
            .photos
            .get(&photo_id)
            .map_or(false, |photo| photo.album_id == album_id);
        if matches {
            state.photos.remove(&photo_id);
        }
        Ok(matches)
    }

    async fn delete_photo_if_unchanged(
        &self,
        album_id: Uuid,
        photo_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let matches = state.photos.get(&photo_id).map_or(false, |photo| {
            photo.album_id == album_id && photo.updated_at == updated_at
        });
        if matches {
            state.photos.remove(&photo_id);
        }
        Ok(matches)
    }

    async fn photos_updated_before(
        &self,
        before: OffsetDateTime,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Photo>> {
        let state = self.state.read().await;
        let mut photos: Vec<Photo> = state
            .photos
            .values()
            .filter(|photo| photo.updated_at < before)
            .filter(|photo| after.map_or(true, |after| photo.id > after))
            .cloned()
            .collect();
        photos.sort_by_key(|photo| photo.id);
        photos.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(photos)
    }
}
