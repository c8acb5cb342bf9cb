use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::AuthUser;
pub use error::AppError;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Slack on top of the base64-expanded upload for the JSON envelope.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.upload_max_bytes.saturating_mul(4) / 3 + BODY_LIMIT_SLACK;

    Router::new()
        .merge(routes::health())
        .merge(routes::albums())
        .merge(routes::photos())
        .merge(routes::files())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Outer layers shared by the server binary: tracing, request ids and CORS.
/// An empty origin list leaves CORS off.
pub fn with_service_layers(router: Router, cors_allowed_origins: &[String]) -> Router {
    let router = match cors_layer(cors_allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    };
    router
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}
