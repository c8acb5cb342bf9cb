pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use crate::app::albums::AlbumService;
use crate::app::auth::TokenVerifier;
use crate::app::locks::PhotoLocks;
use crate::app::photos::PhotoService;
use crate::config::PhotoConfig;
use crate::infra::catalog::Catalog;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub albums: AlbumService,
    pub photos: PhotoService,
    pub tokens: TokenVerifier,
    pub upload_max_bytes: usize,
}

impl AppState {
    pub fn new(catalog: Arc<dyn Catalog>, photo_config: &PhotoConfig, tokens: TokenVerifier) -> Self {
        let photos = PhotoService::new(catalog.clone(), photo_config, PhotoLocks::new());
        let albums = AlbumService::new(catalog.clone(), photos.clone());
        Self {
            catalog,
            albums,
            photos,
            tokens,
            upload_max_bytes: photo_config.max_upload_bytes,
        }
    }
}
