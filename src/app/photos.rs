use bytes::Bytes;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::locks::PhotoLocks;
use crate::app::ownership::OwnershipGuard;
use crate::app::pipeline::{DerivationPipeline, DerivationSettings, DerivedArtifacts};
use crate::config::{OutputFormat, PhotoConfig};
use crate::domain::photo::{ArtifactKind, Photo, PhotoPage, PhotoQuery};
use crate::domain::user::UserId;
use crate::infra::catalog::Catalog;
use crate::infra::paths::{PathResolver, PhotoPaths};
use crate::infra::storage::{LocalStorage, Removal};

/// Photo record lifecycle: keeps catalog rows and artifact files paired.
#[derive(Clone)]
pub struct PhotoService {
    catalog: Arc<dyn Catalog>,
    guard: OwnershipGuard,
    storage: LocalStorage,
    pipeline: DerivationPipeline,
    locks: PhotoLocks,
    output_format: OutputFormat,
    min_upload_bytes: usize,
    max_upload_bytes: usize,
}

/// Bytes of one stored artifact, ready to be served.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    pub photo: Photo,
    pub kind: ArtifactKind,
    pub bytes: Bytes,
    pub content_type: &'static str,
}

impl PhotoService {
    pub fn new(catalog: Arc<dyn Catalog>, config: &PhotoConfig, locks: PhotoLocks) -> Self {
        let resolver = PathResolver::new(
            config.storage_root.clone(),
            &config.public_prefix,
            config.output_format.extension(),
        );
        Self {
            guard: OwnershipGuard::new(catalog.clone()),
            catalog,
            storage: LocalStorage::new(resolver),
            pipeline: DerivationPipeline::new(DerivationSettings::from(config)),
            locks,
            output_format: config.output_format,
            min_upload_bytes: config.min_upload_bytes,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn resolver(&self) -> &PathResolver {
        self.storage.resolver()
    }

    pub async fn add_photo(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        raw: Bytes,
    ) -> ServiceResult<Photo> {
        self.guard.verify(user_id, album_id).await?;
        self.validate_upload(&raw)?;

        let photo = self
            .reserve(user_id, album_id, Uuid::new_v4(), None)
            .await?;
        let artifacts = self.pipeline.derive_off_thread(raw).await;
        self.store(photo, &artifacts).await
    }

    pub async fn get_photo(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        photo_id: Uuid,
    ) -> ServiceResult<Photo> {
        self.guard.verify(user_id, album_id).await?;
        self.find_photo(album_id, photo_id).await
    }

    pub async fn list_photos(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        query: PhotoQuery,
    ) -> ServiceResult<PhotoPage> {
        self.guard.verify(user_id, album_id).await?;

        let total = self.catalog.count_photos(album_id).await?;
        let photos = self.catalog.list_photos(album_id, &query).await?;

        Ok(PhotoPage {
            photos,
            total,
            limit: query.effective_limit(),
            offset: query.effective_offset(),
        })
    }

    /// Replaces the artifacts of an existing photo. The identifier and
    /// creation time survive; the old files and record are destroyed and the
    /// new upload is ingested under the same id.
    pub async fn update_photo(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        photo_id: Uuid,
        raw: Bytes,
    ) -> ServiceResult<Photo> {
        let existing = self.get_photo(user_id, album_id, photo_id).await?;
        self.validate_upload(&raw)?;

        let _lock = self.locks.acquire(photo_id).await;
        // May have been deleted while waiting for the lock.
        let existing = match self.catalog.find_photo(album_id, photo_id).await? {
            Some(photo) => photo,
            None => {
                tracing::debug!(photo_id = %existing.id, "photo removed before update acquired lock");
                return Err(ServiceError::not_found("photo"));
            }
        };

        let artifacts = self.pipeline.derive_off_thread(raw).await;
        self.destroy(&existing).await?;

        let photo = self
            .reserve(user_id, album_id, photo_id, Some(existing.created_at))
            .await?;
        let photo = self.store(photo, &artifacts).await?;
        tracing::info!(user_id = %user_id, album_id = %album_id, photo_id = %photo_id, "photo replaced");
        Ok(photo)
    }

    pub async fn remove_photo(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        photo_id: Uuid,
    ) -> ServiceResult<()> {
        self.guard.verify(user_id, album_id).await?;

        let _lock = self.locks.acquire(photo_id).await;
        let photo = self.find_photo(album_id, photo_id).await?;
        self.destroy(&photo).await?;
        tracing::info!(user_id = %user_id, album_id = %album_id, photo_id = %photo_id, "photo removed");
        Ok(())
    }

    /// Read one artifact of a photo. Ownership and the record are checked
    /// before the filesystem is touched.
    pub async fn open_artifact(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        photo_id: Uuid,
        kind: ArtifactKind,
    ) -> ServiceResult<ArtifactFile> {
        let photo = self.get_photo(user_id, album_id, photo_id).await?;
        let paths = self.paths_for(&photo);
        let path = paths.path(kind);

        let bytes = match self.storage.read(path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(photo_id = %photo_id, path = %path.display(), "artifact missing for existing record");
                return Err(ServiceError::not_found("file"));
            }
            Err(err) => return Err(ServiceError::storage("failed to read artifact", err)),
        };

        let content_type = image::guess_format(&bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or_else(|_| self.output_format.content_type());

        Ok(ArtifactFile {
            photo,
            kind,
            bytes,
            content_type,
        })
    }

    /// Remove every artifact of an album in one sweep. Callers delete the
    /// album record afterwards, which cascades to the photo records.
    pub async fn purge_album_files(&self, user_id: &UserId, album_id: Uuid) -> ServiceResult<()> {
        self.guard.verify(user_id, album_id).await?;
        match self.storage.remove_album_dir(user_id, album_id).await {
            Ok(Removal::Removed) => {
                tracing::info!(user_id = %user_id, album_id = %album_id, "album storage removed");
                Ok(())
            }
            Ok(Removal::AlreadyAbsent) => Ok(()),
            Err(err) => Err(ServiceError::storage("failed to remove album storage", err)),
        }
    }

    /// Drop a record whose master or thumbnail file is missing, along with
    /// whichever artifact survived. Returns whether anything was discarded.
    ///
    /// `snapshot` may be stale. The record is re-read under the lock and the
    /// delete only matches the same `updated_at`, so a photo rewritten by
    /// another process in the meantime is left alone.
    pub async fn discard_if_incomplete(&self, snapshot: &Photo) -> ServiceResult<bool> {
        let _lock = self.locks.acquire(snapshot.id).await;
        let photo = match self.catalog.find_photo(snapshot.album_id, snapshot.id).await? {
            Some(photo) if photo.updated_at == snapshot.updated_at => photo,
            _ => {
                tracing::debug!(photo_id = %snapshot.id, "photo changed since sweep snapshot, skipping");
                return Ok(false);
            }
        };
        let paths = self.paths_for(&photo);

        let master = self.artifact_exists(&paths.master_path).await?;
        let thumbnail = self.artifact_exists(&paths.thumbnail_path).await?;
        if master && thumbnail {
            return Ok(false);
        }

        if !self
            .catalog
            .delete_photo_if_unchanged(photo.album_id, photo.id, photo.updated_at)
            .await?
        {
            tracing::debug!(photo_id = %photo.id, "photo rewritten before discard, skipping");
            return Ok(false);
        }

        tracing::warn!(
            photo_id = %photo.id,
            album_id = %photo.album_id,
            master_present = master,
            thumbnail_present = thumbnail,
            "discarded photo with missing artifacts"
        );
        for (present, path) in [(master, &paths.master_path), (thumbnail, &paths.thumbnail_path)] {
            if present {
                if let Err(err) = self.storage.remove_file(path).await {
                    tracing::warn!(error = %err, path = %path.display(), "failed to remove leftover artifact");
                }
            }
        }
        Ok(true)
    }

    async fn artifact_exists(&self, path: &std::path::Path) -> ServiceResult<bool> {
        self.storage
            .exists(path)
            .await
            .map_err(|err| ServiceError::storage("failed to stat artifact", err))
    }

    pub fn paths_for(&self, photo: &Photo) -> PhotoPaths {
        self.resolver()
            .resolve(&photo.user_id, photo.album_id, photo.id)
    }

    fn validate_upload(&self, raw: &Bytes) -> ServiceResult<()> {
        if raw.is_empty() {
            return Err(ServiceError::invalid("image is required"));
        }
        if raw.len() < self.min_upload_bytes {
            return Err(ServiceError::invalid("image too small, data looks corrupt"));
        }
        if raw.len() > self.max_upload_bytes {
            return Err(ServiceError::invalid("image exceeds max size"));
        }
        Ok(())
    }

    async fn find_photo(&self, album_id: Uuid, photo_id: Uuid) -> ServiceResult<Photo> {
        self.catalog
            .find_photo(album_id, photo_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("photo"))
    }

    /// Persist the record first; this reserves the identifier.
    async fn reserve(
        &self,
        user_id: &UserId,
        album_id: Uuid,
        photo_id: Uuid,
        created_at: Option<OffsetDateTime>,
    ) -> ServiceResult<Photo> {
        let paths = self.resolver().resolve(user_id, album_id, photo_id);
        let now = crate::domain::now_utc();
        let photo = Photo {
            id: photo_id,
            user_id: user_id.clone(),
            album_id,
            image_url: paths.master_url,
            thumbnail_url: paths.thumbnail_url,
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        };
        self.catalog.insert_photo(&photo).await?;
        Ok(photo)
    }

    /// Write both artifacts for a reserved record. On failure the record and
    /// any partial file are removed before the error is returned.
    async fn store(&self, photo: Photo, artifacts: &DerivedArtifacts) -> ServiceResult<Photo> {
        let paths = self.paths_for(&photo);

        let written = match self
            .storage
            .ensure_album_layout(&photo.user_id, photo.album_id)
            .await
        {
            Ok(_) => self
                .storage
                .write_artifacts(
                    &paths,
                    artifacts.master.bytes(),
                    artifacts.thumbnail.bytes(),
                )
                .await
                .map_err(|err| ServiceError::storage("failed to write artifacts", err)),
            Err(err) => Err(ServiceError::storage(
                "failed to create album storage",
                err,
            )),
        };

        if let Err(err) = written {
            tracing::warn!(error = ?err, photo_id = %photo.id, "artifact write failed, rolling back record");
            self.compensate(&photo, &paths).await;
            return Err(err);
        }

        tracing::info!(
            user_id = %photo.user_id,
            album_id = %photo.album_id,
            photo_id = %photo.id,
            master_derived = artifacts.master.is_derived(),
            thumbnail_derived = artifacts.thumbnail.is_derived(),
            master_bytes = artifacts.master.bytes().len(),
            thumbnail_bytes = artifacts.thumbnail.bytes().len(),
            "photo stored"
        );
        Ok(photo)
    }

    async fn compensate(&self, photo: &Photo, paths: &PhotoPaths) {
        for path in [&paths.master_path, &paths.thumbnail_path] {
            if let Err(err) = self.storage.remove_file(path).await {
                tracing::warn!(error = %err, path = %path.display(), "failed to remove partial artifact");
            }
        }
        if let Err(err) = self.catalog.delete_photo(photo.album_id, photo.id).await {
            tracing::error!(error = ?err, photo_id = %photo.id, "failed to roll back photo record");
        }
    }

    /// Files first, then the record. Files that are already gone are fine;
    /// any other removal error keeps the record so nothing is orphaned silently.
    async fn destroy(&self, photo: &Photo) -> ServiceResult<()> {
        let paths = self.paths_for(photo);
        for (label, path) in [
            ("master", &paths.master_path),
            ("thumbnail", &paths.thumbnail_path),
        ] {
            match self.storage.remove_file(path).await {
                Ok(Removal::Removed) => {}
                Ok(Removal::AlreadyAbsent) => {
                    tracing::debug!(photo_id = %photo.id, artifact = label, "artifact already absent");
                }
                Err(err) => {
                    return Err(ServiceError::storage(
                        format!("failed to remove {label} artifact"),
                        err,
                    ))
                }
            }
        }

        self.catalog.delete_photo(photo.album_id, photo.id).await?;
        Ok(())
    }
}
