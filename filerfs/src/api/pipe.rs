//! Bounded in-process pipe between a producer task and a response body.
//!
//! Dropping the reader makes the next write fail with `BrokenPipe`, which
//! stops the producer. Producer failures travel to the reader as an error
//! item and abort the body.
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::body::Body;
use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

type Item = io::Result<Bytes>;

pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter {
            tx: PollSender::new(tx),
        },
        PipeReader { rx },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

pub struct PipeWriter {
    tx: PollSender<Item>,
}

impl PipeWriter {
    /// Hands `err` to the reader in place of further data.
    pub async fn close_with_error(self, err: io::Error) {
        if let Some(tx) = self.tx.get_ref() {
            let _ = tx.send(Err(err)).await;
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        ready!(self.tx.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        self.tx
            .send_item(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.tx.is_closed() {
            return Poll::Ready(Err(broken_pipe()));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tx.close();
        Poll::Ready(Ok(()))
    }
}

pub struct PipeReader {
    rx: mpsc::Receiver<Item>,
}

impl PipeReader {
    pub fn into_body(self) -> Body {
        let mut rx = self.rx;
        Body::from_stream(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }

    #[cfg(test)]
    pub async fn recv(&mut self) -> Option<Item> {
        self.rx.recv().await
    }
}
