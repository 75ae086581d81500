//! Chunk model: entries, their chunk lists and byte ranges.
pub mod cipher;
pub mod reader;
pub mod view;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{FilerError, FilerResult};

pub use reader::VolumeReader;
pub use view::{ChunkView, chunk_views};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attr {
    /// Seconds since the unix epoch.
    pub mtime: i64,
    pub crtime: i64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mime: String,
}

/// One immutable stored segment of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub file_id: String,
    pub offset: u64,
    pub size: u64,
    #[serde(default)]
    pub e_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher_key: Option<Vec<u8>>,
}

impl Chunk {
    pub fn is_encrypted(&self) -> bool {
        self.cipher_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub full_path: String,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub attr: Attr,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl Entry {
    pub fn name(&self) -> &str {
        match self.full_path.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.full_path,
        }
    }

    pub fn total_size(&self) -> FilerResult<u64> {
        total_size(&self.chunks)
    }

    pub fn mtime_system(&self) -> SystemTime {
        if self.attr.mtime <= 0 {
            return UNIX_EPOCH;
        }
        UNIX_EPOCH + Duration::from_secs(self.attr.mtime as u64)
    }
}

/// Half-open request window `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Renders the `Content-Range` value, e.g. `bytes 0-99/1000`.
    pub fn content_range(&self, size: u64) -> String {
        format!(
            "bytes {}-{}/{}",
            self.start,
            self.start + self.length - 1,
            size
        )
    }
}

/// Sum of chunk sizes; a sum past `u64::MAX` means corrupt metadata.
pub fn total_size(chunks: &[Chunk]) -> FilerResult<u64> {
    chunks.iter().try_fold(0u64, |acc, c| {
        acc.checked_add(c.size).ok_or_else(|| {
            FilerError::Integrity(format!("chunk {} overflows the file size", c.file_id))
        })
    })
}

/// Aggregate fingerprint of a chunk list.
///
/// A single chunk keeps its own fingerprint. Otherwise the md5 of the
/// concatenated fingerprints (hex-decoded where possible) is suffixed with the
/// chunk count, the way multipart uploads are tagged by object stores.
pub fn etag(chunks: &[Chunk]) -> String {
    if chunks.len() == 1 {
        return chunks[0].e_tag.clone();
    }
    let mut ctx = md5::Context::new();
    for c in chunks {
        match hex::decode(&c.e_tag) {
            Ok(raw) => ctx.consume(&raw),
            Err(_) => ctx.consume(c.e_tag.as_bytes()),
        }
    }
    format!("{:x}-{}", ctx.compute(), chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(fid: &str, offset: u64, size: u64, e_tag: &str) -> Chunk {
        Chunk {
            file_id: fid.into(),
            offset,
            size,
            e_tag: e_tag.into(),
            cipher_key: None,
        }
    }

    #[test]
    fn test_total_size() {
        assert_eq!(total_size(&[]).unwrap(), 0);
        let chunks = vec![chunk("1,a", 0, 10, ""), chunk("1,b", 10, 5, "")];
        assert_eq!(total_size(&chunks).unwrap(), 15);

        let corrupt = vec![chunk("1,a", 0, u64::MAX, ""), chunk("1,b", 10, 5, "")];
        assert!(matches!(total_size(&corrupt), Err(FilerError::Integrity(_))));
    }

    #[test]
    fn test_etag_single_chunk_passthrough() {
        let chunks = vec![chunk("1,a", 0, 10, "abc")];
        assert_eq!(etag(&chunks), "abc");
    }

    #[test]
    fn test_etag_multi_chunk_is_deterministic() {
        let chunks = vec![
            chunk("1,a", 0, 10, "0123456789abcdef"),
            chunk("1,b", 10, 5, "fedcba9876543210"),
        ];
        let tag = etag(&chunks);
        assert!(tag.ends_with("-2"));
        assert_eq!(tag.len(), 32 + 2);
        assert_eq!(tag, etag(&chunks));

        let mut expected = md5::Context::new();
        expected.consume(hex::decode("0123456789abcdef").unwrap());
        expected.consume(hex::decode("fedcba9876543210").unwrap());
        assert_eq!(tag, format!("{:x}-2", expected.compute()));
    }

    #[test]
    fn test_etag_order_matters() {
        let a = chunk("1,a", 0, 1, "aa");
        let b = chunk("1,b", 1, 1, "bb");
        assert_ne!(etag(&[a.clone(), b.clone()]), etag(&[b, a]));
    }

    #[test]
    fn test_content_range() {
        assert_eq!(ByteRange::new(0, 100).content_range(1000), "bytes 0-99/1000");
        assert_eq!(ByteRange::new(999, 1).content_range(1000), "bytes 999-999/1000");
    }

    #[test]
    fn test_entry_name() {
        let e = Entry {
            full_path: "/a/b/c.txt".into(),
            ..Default::default()
        };
        assert_eq!(e.name(), "c.txt");
        assert!(!chunk("1,a", 0, 1, "").is_encrypted());
        let mut c = chunk("1,a", 0, 1, "");
        c.cipher_key = Some(vec![]);
        assert!(!c.is_encrypted());
        c.cipher_key = Some(vec![1; 32]);
        assert!(c.is_encrypted());
    }
}
