use std::sync::Arc;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::domain::album::Album;
use crate::domain::user::UserId;
use crate::infra::catalog::Catalog;

/// Confirms an album belongs to the caller before anything else happens.
///
/// A missing album and someone else's album produce the same `NotFound`.
#[derive(Clone)]
pub struct OwnershipGuard {
    catalog: Arc<dyn Catalog>,
}

impl OwnershipGuard {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub async fn verify(&self, user_id: &UserId, album_id: Uuid) -> ServiceResult<Album> {
        match self.catalog.find_album(user_id, album_id).await? {
            Some(album) => Ok(album),
            None => {
                tracing::debug!(user_id = %user_id, album_id = %album_id, "album not owned by caller");
                Err(ServiceError::not_found("album"))
            }
        }
    }
}
