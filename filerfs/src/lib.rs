//! filerfs: the read path of a chunked distributed file store.
//!
//! Files are ordered lists of immutable chunks living on volume nodes. This
//! crate serves them over HTTP (range and multipart responses) and through a
//! read-only FUSE gateway.
pub mod api;
pub mod cadapter;
pub mod chunk;
pub mod config;
pub mod error;
pub mod fuse;
pub mod meta;
pub mod utils;
pub mod vfs;

#[cfg(test)]
pub(crate) mod testutil;
