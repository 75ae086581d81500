//! Filesystem gateway
//!
//! `Wfs` is the root object behind the FUSE adapter. It owns the metadata
//! connection pool, the directory listing cache, the open handle table and
//! the inode table. Everything is scoped to one mount.
pub mod handle;
pub mod inode;
pub mod node;

use std::future::Future;
use std::sync::Arc;

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use tracing::{debug, warn};

use crate::chunk::{Attr, Entry, VolumeReader};
use crate::config::{MountOption, normalize_root_path};
use crate::error::{FilerError, FilerResult};
use crate::meta::{ConnectionPool, FilerStatistics, MetaClient, MetaDialer};

pub use handle::{FileHandle, HandleTable};
pub use inode::{InodeTable, ROOT_INO};
pub use node::{Dir, File};

pub const BLOCK_SIZE: u64 = 512;
pub const NAME_LEN: u32 = 1024;
/// Listing page size requested from the metadata service.
const LIST_PAGE_SIZE: u32 = 1024;
/// Cache headroom above the listing limit.
const CACHE_EXTRA_ENTRIES: u64 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statfs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl Statfs {
    fn from_statistics(stats: FilerStatistics) -> Self {
        let files = i64::MAX as u64;
        Self {
            blocks: stats.total_size / BLOCK_SIZE,
            bfree: stats.total_size.saturating_sub(stats.used_size) / BLOCK_SIZE,
            bavail: stats.total_size.saturating_sub(stats.used_size) / BLOCK_SIZE,
            files,
            ffree: files.saturating_sub(stats.file_count),
            bsize: BLOCK_SIZE as u32,
            namelen: NAME_LEN,
            frsize: BLOCK_SIZE as u32,
        }
    }
}

pub struct Wfs {
    option: MountOption,
    list_directory_entries_cache: Cache<String, Arc<Vec<Entry>>>,
    handles: HandleTable,
    pool: ConnectionPool,
    reader: VolumeReader,
    inodes: InodeTable,
}

impl Wfs {
    pub fn new(mut option: MountOption, dialer: Arc<dyn MetaDialer>, reader: VolumeReader) -> Self {
        option.filer_mount_root_path = normalize_root_path(&option.filer_mount_root_path);
        let cache = Cache::builder()
            .max_capacity(option.dir_listing_limit as u64 + CACHE_EXTRA_ENTRIES)
            .time_to_live(option.entry_cache_ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        let inodes = InodeTable::new(&option.filer_mount_root_path);
        Self {
            option,
            list_directory_entries_cache: cache,
            handles: HandleTable::new(),
            pool: ConnectionPool::new(dialer),
            reader,
            inodes,
        }
    }

    pub fn option(&self) -> &MountOption {
        &self.option
    }

    pub fn reader(&self) -> &VolumeReader {
        &self.reader
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn root(&self) -> Dir {
        Dir::new(self.option.filer_mount_root_path.clone())
    }

    /// Runs `f` against the pooled client of the configured filer.
    pub async fn with_filer_client<F, Fut, T>(&self, f: F) -> FilerResult<T>
    where
        F: FnOnce(Arc<dyn MetaClient>) -> Fut,
        Fut: Future<Output = FilerResult<T>>,
    {
        self.pool
            .with_client(&self.option.filer_meta_address, f)
            .await
    }

    pub fn acquire_handle(&self, file: File, uid: u32, gid: u32) -> Arc<FileHandle> {
        self.handles.acquire(file, uid, gid)
    }

    pub fn release_handle(&self, full_path: &str, handle_id: u64) {
        self.handles.release(full_path, handle_id)
    }

    pub fn handle(&self, handle_id: u64) -> Option<Arc<FileHandle>> {
        self.handles.get(handle_id)
    }

    /// Looks up one entry. A missing mount root is presented as an empty
    /// directory.
    pub async fn find_entry(&self, path: &str) -> FilerResult<Entry> {
        let owned = path.to_string();
        match self
            .with_filer_client(|c| async move { c.find_entry(&owned).await })
            .await
        {
            Err(FilerError::NotFound(_)) if path == self.option.filer_mount_root_path => {
                Ok(Entry {
                    full_path: path.to_string(),
                    is_directory: true,
                    attr: Attr {
                        mode: 0o755,
                        ..Default::default()
                    },
                    chunks: Vec::new(),
                })
            }
            other => other,
        }
    }

    /// Lists `dir`, served from the cache while the listing is younger than
    /// the entry cache TTL.
    pub async fn list_directory(&self, dir: &str) -> FilerResult<Arc<Vec<Entry>>> {
        if let Some(hit) = self.list_directory_entries_cache.get(dir).await {
            return Ok(hit);
        }

        let limit = self.option.dir_listing_limit.max(1);
        let dir_owned = dir.to_string();
        let entries = self
            .with_filer_client(|c| async move {
                let mut all: Vec<Entry> = Vec::new();
                let mut start_from = String::new();
                loop {
                    let page_size = LIST_PAGE_SIZE.min(limit - all.len() as u32);
                    let page = match c.list_entries(&dir_owned, &start_from, page_size).await {
                        Ok(page) => page,
                        Err(FilerError::NotFound(_)) => Vec::new(),
                        Err(e) => return Err(e),
                    };
                    let short = (page.len() as u32) < page_size;
                    if let Some(last) = page.last() {
                        start_from = last.name().to_string();
                    }
                    all.extend(page);
                    if short || all.len() as u32 >= limit {
                        break;
                    }
                }
                Ok(all)
            })
            .await?;

        debug!("listed {} entries under {}", entries.len(), dir);
        let entries = Arc::new(entries);
        self.list_directory_entries_cache
            .insert(dir.to_string(), entries.clone())
            .await;
        Ok(entries)
    }

    /// Usage figures are best effort; an unreachable filer reports zeros.
    pub async fn statfs(&self) -> Statfs {
        let stats = match self
            .with_filer_client(|c| async move { c.statistics().await })
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!("reading filer statistics: {}", e);
                FilerStatistics::default()
            }
        };
        Statfs::from_statistics(stats)
    }
}
