use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Album {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Partial album update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
}
