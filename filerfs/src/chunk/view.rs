use crate::chunk::Chunk;
use crate::error::{FilerError, FilerResult};

/// The part of one chunk that falls inside a requested window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkView {
    pub file_id: String,
    pub cipher_key: Option<Vec<u8>>,
    /// Offset of the first wanted byte inside the stored chunk.
    pub offset_in_chunk: u64,
    pub size: u64,
    /// Offset of the first wanted byte inside the logical file.
    pub logic_offset: u64,
    /// Full stored size of the chunk.
    pub chunk_size: u64,
}

impl ChunkView {
    pub fn is_encrypted(&self) -> bool {
        self.cipher_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    pub fn is_full_chunk(&self) -> bool {
        self.offset_in_chunk == 0 && self.size == self.chunk_size
    }
}

/// Resolves `[offset, offset + size)` into per-chunk views in ascending offset
/// order. Gaps and overlaps inside the window are integrity errors, as is a
/// window that runs past the last chunk.
pub fn chunk_views(chunks: &[Chunk], offset: u64, size: u64) -> FilerResult<Vec<ChunkView>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    let stop = offset.checked_add(size).ok_or_else(|| {
        FilerError::Integrity(format!("window {offset}+{size} overflows"))
    })?;

    let mut sorted: Vec<&Chunk> = chunks.iter().filter(|c| c.size > 0).collect();
    sorted.sort_by_key(|c| c.offset);

    let mut views = Vec::new();
    let mut cursor = offset;
    for c in sorted {
        let end = c.offset.checked_add(c.size).ok_or_else(|| {
            FilerError::Integrity(format!("chunk {} overflows the file size", c.file_id))
        })?;
        if end <= offset || c.offset >= stop {
            continue;
        }
        if c.offset > cursor {
            return Err(FilerError::Integrity(format!(
                "gap [{cursor}, {}) before chunk {}",
                c.offset, c.file_id
            )));
        }
        if c.offset < cursor && cursor > offset {
            return Err(FilerError::Integrity(format!(
                "chunk {} at {} overlaps data ending at {cursor}",
                c.file_id, c.offset
            )));
        }
        let view_end = end.min(stop);
        views.push(ChunkView {
            file_id: c.file_id.clone(),
            cipher_key: c.cipher_key.clone(),
            offset_in_chunk: cursor - c.offset,
            size: view_end - cursor,
            logic_offset: cursor,
            chunk_size: c.size,
        });
        cursor = view_end;
    }

    if cursor < stop {
        return Err(FilerError::Integrity(format!(
            "no chunk covers [{cursor}, {stop})"
        )));
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(fid: &str, offset: u64, size: u64) -> Chunk {
        Chunk {
            file_id: fid.into(),
            offset,
            size,
            ..Default::default()
        }
    }

    #[test]
    fn test_views_span_chunk_boundary() {
        let chunks = vec![chunk("1,b", 500, 500), chunk("1,a", 0, 500)];
        let views = chunk_views(&chunks, 400, 200).unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].file_id, "1,a");
        assert_eq!((views[0].offset_in_chunk, views[0].size), (400, 100));
        assert_eq!(views[0].logic_offset, 400);
        assert_eq!(views[1].file_id, "1,b");
        assert_eq!((views[1].offset_in_chunk, views[1].size), (0, 100));
        assert_eq!(views[1].logic_offset, 500);
    }

    #[test]
    fn test_views_inside_one_chunk() {
        let chunks = vec![chunk("1,a", 0, 500), chunk("1,b", 500, 500)];
        let views = chunk_views(&chunks, 900, 100).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].file_id, "1,b");
        assert_eq!(views[0].offset_in_chunk, 400);
        assert!(!views[0].is_full_chunk());

        let whole = chunk_views(&chunks, 0, 1000).unwrap();
        assert!(whole.iter().all(ChunkView::is_full_chunk));
    }

    #[test]
    fn test_empty_window() {
        assert!(chunk_views(&[chunk("1,a", 0, 10)], 3, 0).unwrap().is_empty());
    }

    #[test]
    fn test_gap_is_integrity_error() {
        let chunks = vec![chunk("1,a", 0, 10), chunk("1,b", 20, 10)];
        assert!(matches!(
            chunk_views(&chunks, 5, 20),
            Err(FilerError::Integrity(_))
        ));
        // A window that avoids the gap is still served.
        assert_eq!(chunk_views(&chunks, 20, 5).unwrap().len(), 1);
    }

    #[test]
    fn test_overlap_is_integrity_error() {
        let chunks = vec![chunk("1,a", 0, 10), chunk("1,b", 5, 10)];
        assert!(matches!(
            chunk_views(&chunks, 0, 15),
            Err(FilerError::Integrity(_))
        ));
    }

    #[test]
    fn test_window_past_end() {
        let chunks = vec![chunk("1,a", 0, 10)];
        assert!(chunk_views(&chunks, 5, 10).is_err());
    }

    #[test]
    fn test_chunk_end_overflow_is_integrity_error() {
        let chunks = vec![chunk("1,a", 0, 10), chunk("1,b", 10, u64::MAX)];
        assert!(matches!(
            chunk_views(&chunks, 0, 20),
            Err(FilerError::Integrity(_))
        ));
    }
}
