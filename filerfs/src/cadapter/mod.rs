//! Chunk location and transport adapters (cAdapter)
//!
//! Submodules:
//! - `master`: resolves a chunk file id to a volume URL through the master
//! - `volume`: fetches chunk bytes from volume nodes over HTTP
use std::ops::Range;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;

use crate::error::FilerResult;

pub mod master;
pub mod volume;

pub use master::HttpMasterClient;
pub use volume::HttpVolumeClient;

/// Maps a chunk file id to a fetchable URL.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn lookup_file_id(&self, file_id: &str) -> FilerResult<String>;
}

/// A request forwarded verbatim to a volume node.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Physical chunk transport.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Fetches `range` of the chunk at `url`, or the whole chunk for `None`.
    async fn fetch(&self, url: &str, range: Option<Range<u64>>) -> FilerResult<Bytes>;

    async fn proxy(&self, req: ProxyRequest) -> FilerResult<ProxyResponse>;
}
