use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::album::Album;
use crate::domain::photo::{Photo, PhotoQuery};
use crate::domain::user::UserId;
use crate::infra::catalog::Catalog;

const ALBUM_COLUMNS: &str = "id, user_id, title, description, cover_image, created_at, updated_at";
const PHOTO_COLUMNS: &str =
    "id, user_id, album_id, image_url, thumbnail_url, created_at, updated_at";

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow!("missing required env var: DATABASE_URL"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply every `*.sql` file in `dir`, in file-name order. Migrations are
    /// written to be idempotent.
    pub async fn run_migrations(&self, dir: &Path) -> Result<()> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("cannot read {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "sql"))
            .collect();
        files.sort();

        for path in &files {
            let sql = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration {} failed", path.display()))?;
            tracing::info!(migration = %path.display(), "applied migration");
        }
        Ok(())
    }
}

fn album_from_row(row: &PgRow) -> Result<Album> {
    Ok(Album {
        id: row.try_get("id")?,
        user_id: UserId::parse(row.try_get::<String, _>("user_id")?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        cover_image: row.try_get("cover_image")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn photo_from_row(row: &PgRow) -> Result<Photo> {
    Ok(Photo {
        id: row.try_get("id")?,
        user_id: UserId::parse(row.try_get::<String, _>("user_id")?)?,
        album_id: row.try_get("album_id")?,
        image_url: row.try_get("image_url")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Catalog for Db {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_album(&self, user_id: &UserId, album_id: Uuid) -> Result<Option<Album>> {
        let row = sqlx::query(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE id = $1 AND user_id = $2"
        ))
        .bind(album_id)
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(album_from_row).transpose()
    }

    async fn list_albums(&self, user_id: &UserId) -> Result<Vec<Album>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(album_from_row).collect()
    }

    async fn insert_album(&self, album: &Album) -> Result<()> {
        sqlx::query(
            "INSERT INTO albums (id, user_id, title, description, cover_image, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(album.id)
        .bind(album.user_id.as_str())
        .bind(&album.title)
        .bind(&album.description)
        .bind(&album.cover_image)
        .bind(album.created_at)
        .bind(album.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_album(&self, album: &Album) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE albums \
             SET title = $3, description = $4, cover_image = $5, updated_at = $6 \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(album.id)
        .bind(album.user_id.as_str())
        .bind(&album.title)
        .bind(&album.description)
        .bind(&album.cover_image)
        .bind(album.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_album(&self, user_id: &UserId, album_id: Uuid) -> Result<bool> {
        // photos.album_id is declared ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM albums WHERE id = $1 AND user_id = $2")
            .bind(album_id)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_photo(&self, photo: &Photo) -> Result<()> {
        sqlx::query(
            "INSERT INTO photos (id, user_id, album_id, image_url, thumbnail_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(photo.id)
        .bind(photo.user_id.as_str())
        .bind(photo.album_id)
        .bind(&photo.image_url)
        .bind(&photo.thumbnail_url)
        .bind(photo.created_at)
        .bind(photo.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_photo(&self, album_id: Uuid, photo_id: Uuid) -> Result<Option<Photo>> {
        let row = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id = $1 AND album_id = $2"
        ))
        .bind(photo_id)
        .bind(album_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(photo_from_row).transpose()
    }

    async fn count_photos(&self, album_id: Uuid) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos WHERE album_id = $1")
            .bind(album_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn list_photos(&self, album_id: Uuid, query: &PhotoQuery) -> Result<Vec<Photo>> {
        let order = query.order.as_sql();
        // LIMIT NULL means no limit in Postgres
        let rows = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE album_id = $1 \
             ORDER BY created_at {order}, id {order} \
             OFFSET $2 LIMIT $3"
        ))
        .bind(album_id)
        .bind(query.effective_offset())
        .bind(query.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(photo_from_row).collect()
    }

    async fn delete_photo(&self, album_id: Uuid, photo_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM photos WHERE id = $1 AND album_id = $2")
            .bind(photo_id)
            .bind(album_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_photo_if_unchanged(
        &self,
        album_id: Uuid,
        photo_id: Uuid,
        updated_at: OffsetDateTime,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM photos WHERE id = $1 AND album_id = $2 AND updated_at = $3",
        )
        .bind(photo_id)
        .bind(album_id)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn photos_updated_before(
        &self,
        before: OffsetDateTime,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Photo>> {
        let rows = sqlx::query(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos \
             WHERE updated_at < $1 AND ($2::uuid IS NULL OR id > $2) \
             ORDER BY id \
             LIMIT $3"
        ))
        .bind(before)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(photo_from_row).collect()
    }
}
