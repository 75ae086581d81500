//! VolumeReader: streams a window of a chunked file to a sink in offset order.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::Chunk;
use super::cipher;
use super::view::{ChunkView, chunk_views};
use crate::cadapter::{ChunkTransport, LocationResolver};
use crate::error::{FilerError, FilerResult};

#[derive(Clone)]
pub struct VolumeReader {
    resolver: Arc<dyn LocationResolver>,
    transport: Arc<dyn ChunkTransport>,
}

impl VolumeReader {
    pub fn new(resolver: Arc<dyn LocationResolver>, transport: Arc<dyn ChunkTransport>) -> Self {
        Self {
            resolver,
            transport,
        }
    }

    pub fn resolver(&self) -> &Arc<dyn LocationResolver> {
        &self.resolver
    }

    pub fn transport(&self) -> &Arc<dyn ChunkTransport> {
        &self.transport
    }

    /// Writes bytes `[offset, offset + size)` of the file to `writer`.
    ///
    /// Chunks are fetched and written strictly one after another. On failure
    /// whatever was already written stays written.
    pub async fn stream_content<W>(
        &self,
        writer: &mut W,
        chunks: &[Chunk],
        offset: u64,
        size: u64,
    ) -> FilerResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let views = chunk_views(chunks, offset, size)?;
        for view in &views {
            let data = self.fetch_view(view).await?;
            writer.write_all(&data).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Buffers the window into memory.
    pub async fn read_at(&self, chunks: &[Chunk], offset: u64, size: u64) -> FilerResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(size as usize);
        self.stream_content(&mut buf, chunks, offset, size).await?;
        Ok(buf)
    }

    async fn fetch_view(&self, view: &ChunkView) -> FilerResult<Bytes> {
        let url = self
            .resolver
            .lookup_file_id(&view.file_id)
            .await
            .map_err(|e| match e {
                e @ FilerError::Location { .. } => e,
                other => FilerError::Location {
                    file_id: view.file_id.clone(),
                    reason: other.to_string(),
                },
            })?;
        debug!(
            "fetch {} [{}, +{}) from {}",
            view.file_id, view.offset_in_chunk, view.size, url
        );

        match view.cipher_key.as_deref() {
            Some(key) if !key.is_empty() => {
                // Sealed chunks only decrypt as a whole.
                let sealed = self.transport.fetch(&url, None).await?;
                let plain = cipher::decrypt(&view.file_id, &sealed, key)?;
                let start = view.offset_in_chunk as usize;
                let end = start + view.size as usize;
                if end > plain.len() {
                    return Err(FilerError::Integrity(format!(
                        "chunk {} decrypted to {} bytes, wanted {end}",
                        view.file_id,
                        plain.len()
                    )));
                }
                Ok(Bytes::from(plain).slice(start..end))
            }
            _ => {
                let range = if view.is_full_chunk() {
                    None
                } else {
                    Some(view.offset_in_chunk..view.offset_in_chunk + view.size)
                };
                self.transport.fetch(&url, range).await
            }
        }
    }
}
