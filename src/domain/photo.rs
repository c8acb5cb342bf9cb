use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: Uuid,
    pub user_id: UserId,
    pub album_id: Uuid,
    /// Public URL of the master artifact.
    pub image_url: String,
    /// Public URL of the thumbnail artifact.
    pub thumbnail_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl SortOrder {
    /// Anything other than `asc` falls back to newest first.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some(value) if value.eq_ignore_ascii_case("asc") => Self::Asc,
            _ => Self::Desc,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoQuery {
    /// Only positive limits are applied; anything else means "no limit".
    pub limit: Option<i64>,
    pub offset: i64,
    pub order: SortOrder,
}

impl PhotoQuery {
    pub fn effective_limit(&self) -> Option<i64> {
        self.limit.filter(|limit| *limit > 0)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoPage {
    pub photos: Vec<Photo>,
    /// Count for the whole album, independent of offset and limit.
    pub total: i64,
    pub limit: Option<i64>,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[serde(alias = "master")]
    Original,
    Thumbnail,
}

impl Default for ArtifactKind {
    fn default() -> Self {
        Self::Original
    }
}
