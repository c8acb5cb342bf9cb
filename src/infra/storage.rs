use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::infra::paths::{PathResolver, PhotoPaths};
use crate::domain::user::UserId;
use uuid::Uuid;

/// Outcome of removing a file that may already be gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// Local hierarchical filesystem holding the derived artifacts.
///
/// All mutation of the storage tree goes through this type.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    resolver: PathResolver,
}

impl LocalStorage {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Create the storage root if missing. Called once at startup.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        let root = self.resolver.root();
        if tokio::fs::metadata(root).await.is_err() {
            tokio::fs::create_dir_all(root).await?;
            tracing::info!(root = %root.display(), "created storage root");
        }
        Ok(())
    }

    /// Ensure `<root>/<user>/<album>/thumbnails` exists. The only place
    /// directories are created during ingestion.
    pub async fn ensure_album_layout(
        &self,
        user_id: &UserId,
        album_id: Uuid,
    ) -> std::io::Result<PathBuf> {
        let thumbnails = self.resolver.thumbnails_dir(user_id, album_id);
        tokio::fs::create_dir_all(&thumbnails).await?;
        Ok(thumbnails)
    }

    pub async fn write_artifacts(
        &self,
        paths: &PhotoPaths,
        master: &[u8],
        thumbnail: &[u8],
    ) -> std::io::Result<()> {
        tokio::fs::write(&paths.master_path, master).await?;
        tokio::fs::write(&paths.thumbnail_path, thumbnail).await?;
        Ok(())
    }

    pub async fn remove_file(&self, path: &Path) -> std::io::Result<Removal> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(Removal::Removed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
            Err(err) => Err(err),
        }
    }

    /// Bulk removal of one album's storage directory.
    pub async fn remove_album_dir(
        &self,
        user_id: &UserId,
        album_id: Uuid,
    ) -> std::io::Result<Removal> {
        let dir = self.resolver.album_dir(user_id, album_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(Removal::Removed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Removal::AlreadyAbsent),
            Err(err) => Err(err),
        }
    }

    pub async fn exists(&self, path: &Path) -> std::io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    pub async fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(root: &Path) -> LocalStorage {
        LocalStorage::new(PathResolver::new(root, "/files", "jpg"))
    }

    #[tokio::test]
    async fn writes_and_removes_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path());
        let user = UserId::parse("u1").unwrap();
        let album = Uuid::new_v4();
        let paths = storage.resolver().resolve(&user, album, Uuid::new_v4());

        storage.ensure_album_layout(&user, album).await.unwrap();
        storage.write_artifacts(&paths, b"master", b"thumb").await.unwrap();
        assert_eq!(storage.read(&paths.master_path).await.unwrap(), b"master");
        assert!(storage.exists(&paths.thumbnail_path).await.unwrap());

        assert_eq!(
            storage.remove_file(&paths.master_path).await.unwrap(),
            Removal::Removed
        );
        assert_eq!(
            storage.remove_file(&paths.master_path).await.unwrap(),
            Removal::AlreadyAbsent
        );
    }

    #[tokio::test]
    async fn album_dir_removal_tolerates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path());
        let user = UserId::parse("u1").unwrap();
        let album = Uuid::new_v4();

        assert_eq!(
            storage.remove_album_dir(&user, album).await.unwrap(),
            Removal::AlreadyAbsent
        );
        storage.ensure_album_layout(&user, album).await.unwrap();
        assert_eq!(
            storage.remove_album_dir(&user, album).await.unwrap(),
            Removal::Removed
        );
        assert!(!storage
            .exists(&storage.resolver().album_dir(&user, album))
            .await
            .unwrap());
    }
}
