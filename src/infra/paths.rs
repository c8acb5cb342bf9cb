//! Deterministic mapping from `(user, album, photo)` to on-disk paths and
//! public URLs.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<user_id>/<album_id>/<photo_id>.<ext>
//! <root>/<user_id>/<album_id>/thumbnails/<photo_id>.<ext>
//! ```
//!
//! Public URLs use the same relative layout under the public prefix. Nothing
//! here touches the filesystem.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::photo::ArtifactKind;
use crate::domain::user::UserId;

pub const THUMBNAILS_DIR: &str = "thumbnails";

#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
    public_prefix: String,
    extension: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoPaths {
    pub master_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub master_url: String,
    pub thumbnail_url: String,
}

impl PhotoPaths {
    pub fn path(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Original => &self.master_path,
            ArtifactKind::Thumbnail => &self.thumbnail_path,
        }
    }
}

/// A file name accepted from a public URL, already checked against the
/// resolver's own naming scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArtifactRef {
    pub photo_id: Uuid,
    pub kind: ArtifactKind,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str, extension: &'static str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            extension,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn album_dir(&self, user_id: &UserId, album_id: Uuid) -> PathBuf {
        self.root.join(user_id.as_str()).join(album_id.to_string())
    }

    pub fn thumbnails_dir(&self, user_id: &UserId, album_id: Uuid) -> PathBuf {
        self.album_dir(user_id, album_id).join(THUMBNAILS_DIR)
    }

    pub fn resolve(&self, user_id: &UserId, album_id: Uuid, photo_id: Uuid) -> PhotoPaths {
        let file_name = format!("{}.{}", photo_id, self.extension);
        let album_url = format!("{}/{}/{}", self.public_prefix, user_id, album_id);

        PhotoPaths {
            master_path: self.album_dir(user_id, album_id).join(&file_name),
            thumbnail_path: self.thumbnails_dir(user_id, album_id).join(&file_name),
            master_url: format!("{}/{}", album_url, file_name),
            thumbnail_url: format!("{}/{}/{}", album_url, THUMBNAILS_DIR, file_name),
        }
    }

    /// Parse the trailing part of a public URL (`<id>.<ext>` or
    /// `thumbnails/<id>.<ext>`). Anything that the resolver could not have
    /// produced itself is rejected.
    pub fn parse_artifact(&self, relative: &str) -> Option<ArtifactRef> {
        let relative = relative.trim_start_matches('/');
        let (kind, file_name) = match relative.split_once('/') {
            Some((THUMBNAILS_DIR, rest)) => (ArtifactKind::Thumbnail, rest),
            Some(_) => return None,
            None => (ArtifactKind::Original, relative),
        };

        let (stem, ext) = file_name.rsplit_once('.')?;
        if ext != self.extension {
            return None;
        }
        let photo_id = Uuid::parse_str(stem).ok()?;
        // Reject alternative spellings (braced, urn, uppercase) of the same id.
        if photo_id.to_string() != stem {
            return None;
        }

        Some(ArtifactRef { photo_id, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new("/srv/albums", "/files/", "jpg")
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[test]
    fn resolves_master_and_thumbnail_locations() {
        let album = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
        let photo = Uuid::parse_str("00000000-0000-4000-8000-0000000000aa").unwrap();
        let paths = resolver().resolve(&user("u1"), album, photo);

        assert_eq!(
            paths.master_path,
            PathBuf::from(format!("/srv/albums/u1/{album}/{photo}.jpg"))
        );
        assert_eq!(
            paths.thumbnail_path,
            PathBuf::from(format!("/srv/albums/u1/{album}/thumbnails/{photo}.jpg"))
        );
        assert_eq!(paths.master_url, format!("/files/u1/{album}/{photo}.jpg"));
        assert_eq!(
            paths.thumbnail_url,
            format!("/files/u1/{album}/thumbnails/{photo}.jpg")
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let album = Uuid::new_v4();
        let photo = Uuid::new_v4();
        assert_eq!(
            resolver().resolve(&user("u1"), album, photo),
            resolver().resolve(&user("u1"), album, photo)
        );
    }

    #[test]
    fn distinct_owners_never_collide() {
        let album = Uuid::new_v4();
        let photo = Uuid::new_v4();
        let a = resolver().resolve(&user("alice"), album, photo);
        let b = resolver().resolve(&user("bob"), album, photo);
        let c = resolver().resolve(&user("alice"), Uuid::new_v4(), photo);
        assert_ne!(a.master_path, b.master_path);
        assert_ne!(a.master_path, c.master_path);
        assert_ne!(a.thumbnail_url, b.thumbnail_url);
    }

    #[test]
    fn parses_its_own_urls() {
        let resolver = resolver();
        let photo = Uuid::new_v4();

        let master = resolver.parse_artifact(&format!("{photo}.jpg")).unwrap();
        assert_eq!(master.photo_id, photo);
        assert_eq!(master.kind, ArtifactKind::Original);

        let thumb = resolver
            .parse_artifact(&format!("thumbnails/{photo}.jpg"))
            .unwrap();
        assert_eq!(thumb.kind, ArtifactKind::Thumbnail);
    }

    #[test]
    fn rejects_foreign_file_names() {
        let resolver = resolver();
        let photo = Uuid::new_v4();
        let upper = photo.to_string().to_uppercase();
        for bad in [
            "../etc/passwd".to_string(),
            format!("../{photo}.jpg"),
            format!("{photo}.png"),
            format!("other/{photo}.jpg"),
            format!("thumbnails/../{photo}.jpg"),
            format!("{upper}.jpg"),
            "notes.jpg".to_string(),
        ] {
            assert!(resolver.parse_artifact(&bad).is_none(), "{bad} accepted");
        }
    }
}
