//! `multipart/byteranges` encoding.
use rand::Rng;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::chunk::{ByteRange, Chunk, VolumeReader};
use crate::error::FilerResult;

pub fn random_boundary() -> String {
    let mut buf = [0u8; 30];
    rand::rng().fill(&mut buf);
    hex::encode(buf)
}

/// Delimiter plus headers preceding one part's bytes.
pub fn part_header(boundary: &str, first: bool, ra: &ByteRange, mime: &str, total: u64) -> String {
    let mut h = if first {
        format!("--{boundary}\r\n")
    } else {
        format!("\r\n--{boundary}\r\n")
    };
    h.push_str(&format!("Content-Range: {}\r\n", ra.content_range(total)));
    if !mime.is_empty() {
        h.push_str(&format!("Content-Type: {mime}\r\n"));
    }
    h.push_str("\r\n");
    h
}

pub fn closing(boundary: &str) -> String {
    format!("\r\n--{boundary}--\r\n")
}

/// Exact encoded size of the multipart body, for `Content-Length`.
pub fn ranges_mime_size(ranges: &[ByteRange], boundary: &str, mime: &str, total: u64) -> u64 {
    let mut size = closing(boundary).len() as u64;
    for (i, ra) in ranges.iter().enumerate() {
        size += part_header(boundary, i == 0, ra, mime, total).len() as u64;
        size += ra.length;
    }
    size
}

/// Writes every part in order, then the closing delimiter.
pub async fn write_parts<W>(
    reader: &VolumeReader,
    writer: &mut W,
    chunks: &[Chunk],
    ranges: &[ByteRange],
    boundary: &str,
    mime: &str,
) -> FilerResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total = crate::chunk::total_size(chunks)?;
    for (i, ra) in ranges.iter().enumerate() {
        let header = part_header(boundary, i == 0, ra, mime, total);
        writer.write_all(header.as_bytes()).await?;
        reader
            .stream_content(writer, chunks, ra.start, ra.length)
            .await?;
    }
    writer.write_all(closing(boundary).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
