//! Metadata service client
//!
//! `MetaClient` is what the read path needs from the filer: entry lookup,
//! paged directory listing and usage statistics. `HttpMetaClient` talks to
//! the filer's JSON API; `MetaDialer` produces clients for the pool.
pub mod pool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::chunk::Entry;
use crate::error::{FilerError, FilerResult};

pub use pool::ConnectionPool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilerStatistics {
    pub total_size: u64,
    pub used_size: u64,
    pub file_count: u64,
}

#[async_trait]
pub trait MetaClient: Send + Sync {
    async fn find_entry(&self, path: &str) -> FilerResult<Entry>;

    /// Children of `dir` sorted by name, strictly after `start_from`.
    async fn list_entries(&self, dir: &str, start_from: &str, limit: u32)
    -> FilerResult<Vec<Entry>>;

    async fn statistics(&self) -> FilerResult<FilerStatistics> {
        Ok(FilerStatistics::default())
    }
}

#[async_trait]
pub trait MetaDialer: Send + Sync {
    async fn dial(&self, addr: &str) -> FilerResult<Arc<dyn MetaClient>>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    entries: Vec<Entry>,
}

pub struct HttpMetaClient {
    base: Url,
    http: reqwest::Client,
}

impl HttpMetaClient {
    pub fn new(addr: &str, http: reqwest::Client) -> FilerResult<Self> {
        let base = Url::parse(&format!("http://{addr}/")).map_err(|e| FilerError::Dial {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> FilerResult<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| FilerError::Internal(e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        what: &str,
    ) -> FilerResult<T> {
        let resp = self.http.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(FilerError::NotFound(what.to_string()));
        }
        Ok(resp.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl MetaClient for HttpMetaClient {
    async fn find_entry(&self, path: &str) -> FilerResult<Entry> {
        let url = self.endpoint("api/v1/entry", &[("path", path)])?;
        self.get_json(url, path).await
    }

    async fn list_entries(
        &self,
        dir: &str,
        start_from: &str,
        limit: u32,
    ) -> FilerResult<Vec<Entry>> {
        let limit = limit.to_string();
        let url = self.endpoint(
            "api/v1/list",
            &[("dir", dir), ("startFrom", start_from), ("limit", &limit)],
        )?;
        let list: ListResponse = self.get_json(url, dir).await?;
        Ok(list.entries)
    }

    async fn statistics(&self) -> FilerResult<FilerStatistics> {
        let url = self.endpoint("api/v1/statistics", &[])?;
        self.get_json(url, "statistics").await
    }
}

pub struct HttpMetaDialer {
    timeout: Duration,
}

impl HttpMetaDialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MetaDialer for HttpMetaDialer {
    async fn dial(&self, addr: &str) -> FilerResult<Arc<dyn MetaClient>> {
        let dial_err = |reason: String| FilerError::Dial {
            addr: addr.to_string(),
            reason,
        };
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_idle_timeout(None)
            .build()
            .map_err(|e| dial_err(e.to_string()))?;
        let client = HttpMetaClient::new(addr, http)?;
        tracing::info!("dialed metadata service at {}", addr);
        Ok(Arc::new(client))
    }
}
