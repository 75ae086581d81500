//! In-memory collaborators shared by unit tests.
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use bytes::Bytes;

use crate::cadapter::{ChunkTransport, LocationResolver, ProxyRequest, ProxyResponse};
use crate::chunk::{Attr, Chunk, Entry, cipher};
use crate::error::{FilerError, FilerResult};
use crate::meta::{FilerStatistics, MetaClient, MetaDialer};

pub const VOLUME_PREFIX: &str = "http://volume.local/";

static NEXT_FID: AtomicUsize = AtomicUsize::new(1);

/// Volume node and master in one: resolves `fid` to `VOLUME_PREFIX + fid`.
#[derive(Default)]
pub struct MemoryVolume {
    chunks: Mutex<HashMap<String, Bytes>>,
    pub fetches: AtomicUsize,
    pub proxied: Mutex<Vec<ProxyRequest>>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, fid: &str, data: impl Into<Bytes>) {
        self.chunks.lock().unwrap().insert(fid.into(), data.into());
    }

    pub fn forget(&self, fid: &str) {
        self.chunks.lock().unwrap().remove(fid);
    }

    fn stored(&self, url: &str) -> FilerResult<Bytes> {
        let fid = url
            .strip_prefix(VOLUME_PREFIX)
            .map(|rest| rest.split('?').next().unwrap_or(rest))
            .ok_or_else(|| FilerError::Transport(format!("unknown node {url}")))?;
        self.chunks
            .lock()
            .unwrap()
            .get(fid)
            .cloned()
            .ok_or_else(|| FilerError::Transport(format!("{fid} missing on node")))
    }
}

#[async_trait]
impl LocationResolver for MemoryVolume {
    async fn lookup_file_id(&self, file_id: &str) -> FilerResult<String> {
        if self.chunks.lock().unwrap().contains_key(file_id) {
            Ok(format!("{VOLUME_PREFIX}{file_id}"))
        } else {
            Err(FilerError::Location {
                file_id: file_id.into(),
                reason: "volume not found".into(),
            })
        }
    }
}

#[async_trait]
impl ChunkTransport for MemoryVolume {
    async fn fetch(&self, url: &str, range: Option<Range<u64>>) -> FilerResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let data = self.stored(url)?;
        Ok(match range {
            Some(r) => data.slice(r.start as usize..r.end as usize),
            None => data,
        })
    }

    async fn proxy(&self, req: ProxyRequest) -> FilerResult<ProxyResponse> {
        let data = self.stored(&req.url)?;
        self.proxied.lock().unwrap().push(req);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(data.len()));
        Ok(ProxyResponse {
            status: StatusCode::OK,
            headers,
            body: Body::from(data),
        })
    }
}

/// Stores a file made of chunks of `sizes` on `volume` and returns its entry
/// together with the plaintext content.
pub fn chunked_file(
    volume: &MemoryVolume,
    path: &str,
    sizes: &[u64],
    key: Option<[u8; 32]>,
) -> (Entry, Vec<u8>) {
    let total: u64 = sizes.iter().sum();
    let content: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
    let mut chunks = Vec::new();
    let mut offset = 0u64;
    for &size in sizes {
        let fid = format!("3,{:08x}", NEXT_FID.fetch_add(1, Ordering::SeqCst));
        let plain = &content[offset as usize..(offset + size) as usize];
        let stored = match &key {
            Some(k) => cipher::encrypt(plain, k),
            None => plain.to_vec(),
        };
        volume.put(&fid, stored);
        chunks.push(Chunk {
            file_id: fid,
            offset,
            size,
            e_tag: format!("{:x}", md5::compute(plain)),
            cipher_key: key.map(|k| k.to_vec()),
        });
        offset += size;
    }
    let entry = Entry {
        full_path: path.into(),
        is_directory: false,
        attr: Attr {
            mtime: 1_700_000_000,
            crtime: 1_700_000_000,
            mode: 0o644,
            ..Default::default()
        },
        chunks,
    };
    (entry, content)
}

pub fn dir_entry(path: &str) -> Entry {
    Entry {
        full_path: path.into(),
        is_directory: true,
        attr: Attr {
            mtime: 1_700_000_000,
            mode: 0o755,
            ..Default::default()
        },
        chunks: Vec::new(),
    }
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "/",
    }
}

/// Metadata service backed by a path-sorted map.
#[derive(Default)]
pub struct MemoryMeta {
    entries: Mutex<BTreeMap<String, Entry>>,
    pub stats: Mutex<Option<FilerStatistics>>,
    pub finds: AtomicUsize,
    pub lists: AtomicUsize,
}

impl MemoryMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: Entry) {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.full_path.clone(), entry);
    }
}

#[async_trait]
impl MetaClient for MemoryMeta {
    async fn find_entry(&self, path: &str) -> FilerResult<Entry> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| FilerError::NotFound(path.into()))
    }

    async fn list_entries(
        &self,
        dir: &str,
        start_from: &str,
        limit: u32,
    ) -> FilerResult<Vec<Entry>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .values()
            .filter(|e| e.full_path != "/" && parent_of(&e.full_path) == dir)
            .filter(|e| e.name() > start_from)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn statistics(&self) -> FilerResult<FilerStatistics> {
        match *self.stats.lock().unwrap() {
            Some(s) => Ok(s),
            None => Err(FilerError::Transport("statistics unavailable".into())),
        }
    }
}

pub struct FakeDialer {
    meta: Option<Arc<MemoryMeta>>,
    pub dials: AtomicUsize,
}

impl FakeDialer {
    pub fn new(meta: Arc<MemoryMeta>) -> Self {
        Self {
            meta: Some(meta),
            dials: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            meta: None,
            dials: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetaDialer for FakeDialer {
    async fn dial(&self, addr: &str) -> FilerResult<Arc<dyn MetaClient>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers could race.
        tokio::time::sleep(Duration::from_millis(10)).await;
        match &self.meta {
            Some(meta) => Ok(meta.clone()),
            None => Err(FilerError::Dial {
                addr: addr.into(),
                reason: "connection refused".into(),
            }),
        }
    }
}
