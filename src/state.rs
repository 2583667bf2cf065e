//! Shared state handed to every handler.

use crate::{
    pipeline::Pipeline,
    services::{rate_limiter::RateLimiter, storage_service::StorageService, traits::GalleryStore},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub gallery: Arc<dyn GalleryStore>,
    pub pipeline: Pipeline,
    pub upload_limiter: RateLimiter,
}
