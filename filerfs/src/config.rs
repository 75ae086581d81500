use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FilerError, FilerResult};

pub const DEFAULT_DIR_LISTING_LIMIT: u32 = 100_000;
pub const DEFAULT_ENTRY_CACHE_TTL: Duration = Duration::from_secs(3);
pub const DEFAULT_CHUNK_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// The metadata endpoint listens this far above the filer's HTTP port.
pub const META_PORT_OFFSET: u16 = 10000;

/// Options of the HTTP read server.
#[derive(Clone, Debug)]
pub struct ServerOption {
    pub master: String,
    pub filer_meta_address: String,
    pub redirect_on_read: bool,
    pub disable_dir_listing: bool,
    pub dir_listing_limit: u32,
    pub chunk_fetch_timeout: Duration,
}

impl Default for ServerOption {
    fn default() -> Self {
        Self {
            master: "localhost:9333".into(),
            filer_meta_address: "localhost:18888".into(),
            redirect_on_read: false,
            disable_dir_listing: false,
            dir_listing_limit: DEFAULT_DIR_LISTING_LIMIT,
            chunk_fetch_timeout: DEFAULT_CHUNK_FETCH_TIMEOUT,
        }
    }
}

/// Options of the FUSE gateway.
#[derive(Clone, Debug)]
pub struct MountOption {
    pub filer_meta_address: String,
    pub filer_mount_root_path: String,
    pub master: String,
    pub mount_point: PathBuf,
    pub dir_listing_limit: u32,
    pub entry_cache_ttl: Duration,
    pub chunk_fetch_timeout: Duration,
}

impl Default for MountOption {
    fn default() -> Self {
        Self {
            filer_meta_address: "localhost:18888".into(),
            filer_mount_root_path: "/".into(),
            master: "localhost:9333".into(),
            mount_point: PathBuf::from("/mnt/filerfs"),
            dir_listing_limit: DEFAULT_DIR_LISTING_LIMIT,
            entry_cache_ttl: DEFAULT_ENTRY_CACHE_TTL,
            chunk_fetch_timeout: DEFAULT_CHUNK_FETCH_TIMEOUT,
        }
    }
}

/// Derives the metadata service address from the filer's `host:port`.
///
/// An explicit `meta_port` wins; otherwise the filer port plus
/// [`META_PORT_OFFSET`] is used.
pub fn parse_filer_meta_address(filer: &str, meta_port: Option<u16>) -> FilerResult<String> {
    let invalid = || FilerError::Internal(format!("invalid filer address `{filer}`"));
    let (host, port) = filer.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let meta_port = match meta_port {
        Some(p) if p != 0 => p,
        _ => port.checked_add(META_PORT_OFFSET).ok_or_else(invalid)?,
    };
    Ok(format!("{host}:{meta_port}"))
}

/// Normalizes a mount root to an absolute path without a trailing slash.
pub fn normalize_root_path(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".into()
    } else if trimmed.starts_with('/') {
        trimmed.into()
    } else {
        format!("/{trimmed}")
    }
}
