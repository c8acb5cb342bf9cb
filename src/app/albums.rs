use std::sync::Arc;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::ownership::OwnershipGuard;
use crate::app::photos::PhotoService;
use crate::domain::album::{Album, AlbumChanges};
use crate::domain::now_utc;
use crate::domain::user::UserId;
use crate::infra::catalog::Catalog;

const MAX_TITLE_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_COVER_IMAGE_LEN: usize = 500;

#[derive(Clone)]
pub struct AlbumService {
    catalog: Arc<dyn Catalog>,
    guard: OwnershipGuard,
    photos: PhotoService,
}

impl AlbumService {
    pub fn new(catalog: Arc<dyn Catalog>, photos: PhotoService) -> Self {
        Self {
            guard: OwnershipGuard::new(catalog.clone()),
            catalog,
            photos,
        }
    }

    pub async fn create_album(
        &self,
        user_id: &UserId,
        title: String,
        description: Option<String>,
        cover_image: Option<String>,
    ) -> ServiceResult<Album> {
        let title = validate_title(&title)?;
        validate_optional(description.as_deref(), "description", MAX_DESCRIPTION_LEN)?;
        validate_optional(cover_image.as_deref(), "cover_image", MAX_COVER_IMAGE_LEN)?;

        let now = now_utc();
        let album = Album {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            title,
            description,
            cover_image,
            created_at: now,
            updated_at: now,
        };
        self.catalog.insert_album(&album).await?;
        tracing::info!(user_id = %user_id, album_id = %album.id, "album created");
        Ok(album)
    }

    pub async fn list_albums(&self, user_id: &UserId) -> ServiceResult<Vec<Album>> {
        Ok(self.catalog.list_albums(user_id).await?)
    }

    pub async fn get_album(&self, user_id: &UserId, album_id: Uuid) -> ServiceResult<Album> {
        self.guard.verify(user_id, album_id).await
    }

    pub async fn update_album(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        changes: AlbumChanges,
    ) -> ServiceResult<Album> {
        let mut album = self.guard.verify(user_id, album_id).await?;

        if let Some(title) = changes.title {
            album.title = validate_title(&title)?;
        }
        if let Some(description) = changes.description {
            validate_optional(Some(&description), "description", MAX_DESCRIPTION_LEN)?;
            album.description = Some(description);
        }
        if let Some(cover_image) = changes.cover_image {
            validate_optional(Some(&cover_image), "cover_image", MAX_COVER_IMAGE_LEN)?;
            album.cover_image = Some(cover_image);
        }
        album.updated_at = now_utc();

        if !self.catalog.update_album(&album).await? {
            return Err(ServiceError::not_found("album"));
        }
        Ok(album)
    }

    /// Storage first, then the record. If the directory cannot be removed the
    /// album and its photos stay in place.
    pub async fn delete_album(&self, user_id: &UserId, album_id: Uuid) -> ServiceResult<()> {
        self.photos.purge_album_files(user_id, album_id).await?;

        if !self.catalog.delete_album(user_id, album_id).await? {
            return Err(ServiceError::not_found("album"));
        }
        tracing::info!(user_id = %user_id, album_id = %album_id, "album deleted");
        Ok(())
    }
}

fn validate_title(title: &str) -> ServiceResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::invalid("title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ServiceError::invalid(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_optional(value: Option<&str>, field: &str, max: usize) -> ServiceResult<()> {
    match value {
        Some(value) if value.chars().count() > max => Err(ServiceError::invalid(format!(
            "{field} must be at most {max} characters"
        ))),
        _ => Ok(()),
    }
}
