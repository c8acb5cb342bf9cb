use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::app::photos::ArtifactFile;
use crate::domain::album::{Album, AlbumChanges};
use crate::domain::photo::{ArtifactKind, Photo, PhotoPage, PhotoQuery, SortOrder};
use crate::http::{AppError, AuthUser};
use crate::AppState;

const ARTIFACT_CACHE_CONTROL: &str = "private, max-age=31536000";

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.catalog.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, "catalog ping failed");
            "degraded"
        }
    };
    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Albums
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateAlbumRequest {
    pub title: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
}

pub async fn create_album(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAlbumRequest>,
) -> Result<(StatusCode, Json<Album>), AppError> {
    let album = state
        .albums
        .create_album(
            &auth.user_id,
            payload.title,
            payload.description,
            payload.cover_image,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(album)))
}

pub async fn list_albums(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Album>>, AppError> {
    Ok(Json(state.albums.list_albums(&auth.user_id).await?))
}

pub async fn get_album(
    auth: AuthUser,
    Path(album_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Album>, AppError> {
    Ok(Json(state.albums.get_album(&auth.user_id, album_id).await?))
}

pub async fn update_album(
    auth: AuthUser,
    Path(album_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<AlbumChanges>,
) -> Result<Json<Album>, AppError> {
    let album = state
        .albums
        .update_album(&auth.user_id, album_id, payload)
        .await?;
    Ok(Json(album))
}

pub async fn delete_album(
    auth: AuthUser,
    Path(album_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state.albums.delete_album(&auth.user_id, album_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Photos
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ListPhotosQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order: Option<String>,
}

impl From<ListPhotosQuery> for PhotoQuery {
    fn from(query: ListPhotosQuery) -> Self {
        PhotoQuery {
            limit: query.limit,
            offset: query.offset.unwrap_or(0),
            order: SortOrder::from_param(query.order.as_deref()),
        }
    }
}

/// Upload body: base64 image data, optionally as a `data:` URL.
#[derive(Deserialize)]
pub struct PhotoUploadRequest {
    pub image: String,
}

pub async fn list_photos(
    auth: AuthUser,
    Path(album_id): Path<Uuid>,
    Query(query): Query<ListPhotosQuery>,
    State(state): State<AppState>,
) -> Result<Json<PhotoPage>, AppError> {
    let page = state
        .photos
        .list_photos(&auth.user_id, album_id, query.into())
        .await?;
    Ok(Json(page))
}

pub async fn add_photo(
    auth: AuthUser,
    Path(album_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<PhotoUploadRequest>,
) -> Result<(StatusCode, Json<Photo>), AppError> {
    let raw = decode_image(&payload.image, state.upload_max_bytes)?;
    let photo = state.photos.add_photo(&auth.user_id, album_id, raw).await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

pub async fn get_photo(
    auth: AuthUser,
    Path((album_id, photo_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<Photo>, AppError> {
    let photo = state
        .photos
        .get_photo(&auth.user_id, album_id, photo_id)
        .await?;
    Ok(Json(photo))
}

pub async fn update_photo(
    auth: AuthUser,
    Path((album_id, photo_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
    Json(payload): Json<PhotoUploadRequest>,
) -> Result<Json<Photo>, AppError> {
    let raw = decode_image(&payload.image, state.upload_max_bytes)?;
    let photo = state
        .photos
        .update_photo(&auth.user_id, album_id, photo_id, raw)
        .await?;
    Ok(Json(photo))
}

pub async fn delete_photo(
    auth: AuthUser,
    Path((album_id, photo_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state
        .photos
        .remove_photo(&auth.user_id, album_id, photo_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Artifact bytes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ImageQuery {
    #[serde(default)]
    pub size: ArtifactKind,
}

pub async fn photo_image(
    auth: AuthUser,
    Path((album_id, photo_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let file = state
        .photos
        .open_artifact(&auth.user_id, album_id, photo_id, query.size)
        .await?;
    Ok(artifact_response(file, &headers))
}

/// Public mount: `/files/<user>/<album>/<photo>.<ext>` and
/// `/files/<user>/<album>/thumbnails/<photo>.<ext>`. Every malformed path is
/// reported as not found.
pub async fn public_file(
    auth: AuthUser,
    Path((user_id, album_id, file)): Path<(String, String, String)>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if user_id != auth.user_id.as_str() {
        return Err(AppError::not_found("file not found"));
    }
    let album_id =
        Uuid::parse_str(&album_id).map_err(|_| AppError::not_found("file not found"))?;
    let artifact = state
        .photos
        .resolver()
        .parse_artifact(&file)
        .ok_or_else(|| AppError::not_found("file not found"))?;

    let file = state
        .photos
        .open_artifact(&auth.user_id, album_id, artifact.photo_id, artifact.kind)
        .await?;
    Ok(artifact_response(file, &headers))
}

fn artifact_response(file: ArtifactFile, request_headers: &HeaderMap) -> Response {
    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&file.bytes)));

    let not_modified = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').any(|tag| tag.trim() == etag))
        .unwrap_or(false);

    let mut response = if not_modified {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        let mut response = Response::new(Body::from(file.bytes));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(file.content_type),
        );
        response
    };

    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(ARTIFACT_CACHE_CONTROL),
    );
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    response
}

/// Decode the base64 upload field. Whitespace and a `data:<mime>;base64,`
/// prefix are tolerated.
pub(crate) fn decode_image(encoded: &str, max_bytes: usize) -> Result<Bytes, AppError> {
    let encoded = encoded.trim();
    let encoded = match encoded.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, data)| data)
            .ok_or_else(|| AppError::bad_request("image must be base64 encoded"))?,
        None => encoded,
    };

    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(AppError::bad_request("image is required"));
    }
    if compact.len() / 4 * 3 > max_bytes.saturating_add(3) {
        return Err(AppError::bad_request("image exceeds max size"));
    }

    let decoded = STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| AppError::bad_request("image is not valid base64"))?;
    if decoded.len() > max_bytes {
        return Err(AppError::bad_request("image exceeds max size"));
    }
    Ok(Bytes::from(decoded))
}
