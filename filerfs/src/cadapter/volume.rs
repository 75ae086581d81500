//! Volume node transport over HTTP.
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{StatusCode, header};
use bytes::Bytes;
use tracing::debug;

use crate::cadapter::{ChunkTransport, ProxyRequest, ProxyResponse};
use crate::error::{FilerError, FilerResult};

pub struct HttpVolumeClient {
    http: reqwest::Client,
}

impl HttpVolumeClient {
    /// `timeout` bounds each chunk request; there is no retry.
    pub fn new(timeout: Duration) -> FilerResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

/// Cuts `range` out of a full chunk body when the node ignored the
/// `Range` header.
fn slice_local(url: &str, body: Bytes, range: &Range<u64>) -> FilerResult<Bytes> {
    let (start, end) = (range.start as usize, range.end as usize);
    if end > body.len() || start > end {
        return Err(FilerError::Transport(format!(
            "{url}: short body {} for range {start}..{end}",
            body.len()
        )));
    }
    Ok(body.slice(start..end))
}

#[async_trait]
impl ChunkTransport for HttpVolumeClient {
    async fn fetch(&self, url: &str, range: Option<Range<u64>>) -> FilerResult<Bytes> {
        let mut req = self.http.get(url);
        if let Some(r) = &range {
            if r.is_empty() {
                return Ok(Bytes::new());
            }
            req = req.header(header::RANGE, format!("bytes={}-{}", r.start, r.end - 1));
        }
        let resp = req.send().await?.error_for_status()?;
        let partial = resp.status() == StatusCode::PARTIAL_CONTENT;
        let body = resp.bytes().await?;
        match range {
            Some(r) if !partial => {
                debug!("{} ignored range request, slicing locally", url);
                slice_local(url, body, &r)
            }
            _ => Ok(body),
        }
    }

    async fn proxy(&self, req: ProxyRequest) -> FilerResult<ProxyResponse> {
        let resp = self
            .http
            .request(req.method, &req.url)
            .headers(req.headers)
            .body(req.body)
            .send()
            .await?;
        Ok(ProxyResponse {
            status: resp.status(),
            headers: resp.headers().clone(),
            body: Body::from_stream(resp.bytes_stream()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_local() {
        let body = Bytes::from_static(b"0123456789");
        assert_eq!(slice_local("u", body.clone(), &(2..5)).unwrap(), "234");
        assert!(slice_local("u", body, &(8..12)).is_err());
    }

    #[tokio::test]
    async fn test_empty_range_skips_request() {
        let client = HttpVolumeClient::new(Duration::from_millis(50)).unwrap();
        let data = client.fetch("http://127.0.0.1:1/3,01", Some(4..4)).await.unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let client = HttpVolumeClient::new(Duration::from_millis(200)).unwrap();
        let err = client.fetch("http://127.0.0.1:1/3,01", None).await.unwrap_err();
        assert!(matches!(err, FilerError::Transport(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
