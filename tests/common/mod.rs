#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pasetors::claims::Claims;
use pasetors::keys::SymmetricKey;
use pasetors::{local, version4::V4};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use leonaar::app::auth::TokenVerifier;
use leonaar::config::{decode_key_32, PhotoConfig};
use leonaar::domain::user::UserId;
use leonaar::infra::memory::MemoryCatalog;
use leonaar::AppState;

// "0123456789abcdef0123456789abcdef" (32 bytes, test-only)
const TEST_PASETO_ACCESS_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
const TEST_ISSUER: &str = "leonaar";

// ---------------------------------------------------------------------------
// TestApp: one per test, backed by the memory catalog and a temp storage root
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub catalog: Arc<MemoryCatalog>,
    token_key: [u8; 32],
    storage: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

pub struct TestUser {
    pub id: UserId,
    pub access_token: String,
}

pub fn app() -> TestApp {
    TestApp::setup(|_| {})
}

impl TestApp {
    pub fn setup(tweak: impl FnOnce(&mut PhotoConfig)) -> Self {
        let storage = tempfile::tempdir().expect("failed to create temp storage root");
        let mut config = PhotoConfig::with_root(storage.path().join("albums"));
        tweak(&mut config);

        let key = decode_key_32("PASETO_ACCESS_KEY", TEST_PASETO_ACCESS_KEY)
            .expect("test key must decode");
        let tokens = TokenVerifier::new(key, TEST_ISSUER);
        let catalog = Arc::new(MemoryCatalog::new());
        let state = AppState::new(catalog.clone(), &config, tokens);
        let router = leonaar::http::router(state.clone());

        TestApp {
            router,
            state,
            catalog,
            token_key: key,
            storage,
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        self.state.photos.resolver().root().to_path_buf()
    }

    pub fn temp_dir(&self) -> &std::path::Path {
        self.storage.path()
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body_bytes,
        }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.send(Method::POST, path, Some(body), token).await
    }

    pub async fn put_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.send(Method::PUT, path, Some(body), token).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.send(Method::PATCH, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::DELETE, path, None, token).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(method, path, body, &headers).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Mint an access token for `id` directly (login is out of scope).
    pub fn create_user(&self, id: &str) -> TestUser {
        let user_id = UserId::parse(id).expect("valid test user id");
        let access_token = mint_access_token(&self.token_key, &user_id, Duration::from_secs(600));
        TestUser {
            id: user_id,
            access_token,
        }
    }

    /// Create an album through the API. Returns its id.
    pub async fn create_album(&self, user: &TestUser, title: &str) -> String {
        let resp = self
            .post_json(
                "/albums",
                json!({ "title": title }),
                Some(&user.access_token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
        resp.json()["id"].as_str().expect("album id").to_string()
    }

    /// Upload an image through the API. Returns the photo JSON.
    pub async fn upload_photo(&self, user: &TestUser, album_id: &str, image: &[u8]) -> Value {
        let resp = self
            .post_json(
                &format!("/albums/{album_id}/photos"),
                json!({ "image": STANDARD.encode(image) }),
                Some(&user.access_token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
        resp.json()
    }

    /// Map a public URL (`/files/...`) to its path under the storage root.
    pub fn file_for_url(&self, url: &str) -> PathBuf {
        let relative = url
            .strip_prefix("/files/")
            .expect("url under the public prefix");
        self.storage_root().join(relative)
    }
}

/// PASETO v4.local access token, shaped the way the identity provider issues them.
pub fn mint_access_token(key: &[u8; 32], user_id: &UserId, ttl: Duration) -> String {
    let mut claims = Claims::new_expires_in(&ttl).expect("claims");
    claims.issuer(TEST_ISSUER).expect("issuer");
    claims.audience(TEST_ISSUER).expect("audience");
    claims.subject(user_id.as_str()).expect("subject");
    claims.add_additional("typ", "access").expect("typ");
    let key = SymmetricKey::<V4>::from(key).expect("token key");
    local::encrypt(&key, &claims, None, None).expect("encrypt token")
}

/// Encode a synthetic gradient as PNG.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub fn dimensions(bytes: &[u8]) -> (u32, u32) {
    use image::GenericImageView;
    image::load_from_memory(bytes)
        .expect("decodable image")
        .dimensions()
}
