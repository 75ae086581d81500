pub mod listing;
pub mod multipart;
pub mod pipe;
pub mod range;
pub mod read;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::chunk::VolumeReader;
use crate::config::ServerOption;
use crate::meta::MetaClient;

#[derive(Clone)]
pub struct AppState {
    pub option: Arc<ServerOption>,
    pub meta: Arc<dyn MetaClient>,
    pub reader: VolumeReader,
}

impl AppState {
    pub fn new(option: ServerOption, meta: Arc<dyn MetaClient>, reader: VolumeReader) -> Self {
        Self {
            option: Arc::new(option),
            meta,
            reader,
        }
    }
}

/// Every path is a potential file, so reads are served from the fallback.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(read::get_or_head_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
