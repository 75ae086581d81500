//! Master client: `GET /dir/lookup?volumeId=<vid>` with a volume location cache.
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Deserialize;
use tracing::debug;

use crate::cadapter::LocationResolver;
use crate::error::{FilerError, FilerResult};

const LOCATION_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
const LOCATION_CACHE_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLocation {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResult {
    #[serde(default)]
    locations: Vec<VolumeLocation>,
    #[serde(default)]
    error: String,
}

pub struct HttpMasterClient {
    master: String,
    http: reqwest::Client,
    locations: Cache<String, Vec<VolumeLocation>>,
}

impl HttpMasterClient {
    pub fn new(master: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            master: master.into(),
            http,
            locations: Cache::builder()
                .max_capacity(LOCATION_CACHE_CAPACITY)
                .time_to_live(LOCATION_CACHE_TTL)
                .build(),
        }
    }

    async fn lookup_volume(&self, vid: &str) -> FilerResult<Vec<VolumeLocation>> {
        if let Some(hit) = self.locations.get(vid).await {
            return Ok(hit);
        }
        let url = format!("http://{}/dir/lookup", self.master);
        let resp = self
            .http
            .get(&url)
            .query(&[("volumeId", vid)])
            .send()
            .await?
            .error_for_status()?;
        let result: LookupResult = resp.json().await?;
        if !result.error.is_empty() {
            return Err(FilerError::Location {
                file_id: vid.to_string(),
                reason: result.error,
            });
        }
        if result.locations.is_empty() {
            return Err(FilerError::Location {
                file_id: vid.to_string(),
                reason: "no volume location".into(),
            });
        }
        debug!("volume {} located on {} node(s)", vid, result.locations.len());
        self.locations
            .insert(vid.to_string(), result.locations.clone())
            .await;
        Ok(result.locations)
    }
}

/// Volume id part of `"<vid>,<key>"`.
pub fn volume_id(file_id: &str) -> Option<&str> {
    match file_id.split_once(',') {
        Some((vid, key)) if !vid.is_empty() && !key.is_empty() => Some(vid),
        _ => None,
    }
}

#[async_trait]
impl LocationResolver for HttpMasterClient {
    async fn lookup_file_id(&self, file_id: &str) -> FilerResult<String> {
        let vid = volume_id(file_id).ok_or_else(|| FilerError::Location {
            file_id: file_id.to_string(),
            reason: "malformed file id".into(),
        })?;
        let locations = self.lookup_volume(vid).await.map_err(|e| match e {
            FilerError::Location { reason, .. } => FilerError::Location {
                file_id: file_id.to_string(),
                reason,
            },
            other => FilerError::Location {
                file_id: file_id.to_string(),
                reason: other.to_string(),
            },
        })?;
        let loc = &locations[0];
        Ok(format!("http://{}/{}", loc.url, file_id))
    }
}
