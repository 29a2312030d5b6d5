//! Electron release feed over HTTP

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{ConfigError, UpstreamConfig};
use crate::upstream::client::FeedClient;
use crate::upstream::error::FetchError;
use crate::upstream::http::{build_client, decode_each, ensure_success};
use crate::upstream::types::{ActiveBuildSet, BuildJob, Release};

/// Record of the release index
#[derive(Debug, Deserialize)]
struct RawRelease {
    version: String,
    date: NaiveDate,
    #[serde(default)]
    chrome: String,
    #[serde(default)]
    node: String,
}

impl From<RawRelease> for Release {
    fn from(raw: RawRelease) -> Self {
        Self {
            version: raw.version,
            date: raw.date,
            chrome: raw.chrome,
            node: raw.node,
        }
    }
}

/// Response from the active-build endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawActiveBuilds {
    #[serde(default)]
    currently_running: Vec<serde_json::Value>,
    #[serde(default)]
    queued: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawBuildJob {
    id: String,
    branch: String,
    channel: String,
    #[serde(alias = "startedAt")]
    started: DateTime<Utc>,
}

impl From<RawBuildJob> for BuildJob {
    fn from(raw: RawBuildJob) -> Self {
        Self {
            id: raw.id,
            branch: raw.branch,
            channel: raw.channel,
            started_at: raw.started,
        }
    }
}

/// Feed client backed by reqwest
pub struct HttpFeedClient {
    client: reqwest::Client,
    feed_url: String,
    active_builds_url: String,
}

impl HttpFeedClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(HeaderMap::new(), config.timeout())?,
            feed_url: config.feed_url.clone(),
            active_builds_url: config.active_builds_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_release_index(&self) -> Result<Vec<Release>, FetchError> {
        let response = self.client.get(&self.feed_url).send().await?;
        let response = ensure_success(response)?;

        let records: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            warn!("Failed to read release index: {}", e);
            FetchError::from(e)
        })?;

        let total = records.len();
        let releases: Vec<Release> = decode_each::<RawRelease>(records, "release record")
            .into_iter()
            .map(Release::from)
            .collect();
        debug!("Decoded {} of {} release records", releases.len(), total);

        Ok(releases)
    }

    async fn fetch_active_builds(&self) -> Result<ActiveBuildSet, FetchError> {
        let response = self.client.get(&self.active_builds_url).send().await?;
        let response = ensure_success(response)?;

        let raw: RawActiveBuilds = response.json().await.map_err(|e| {
            warn!("Failed to read active builds response: {}", e);
            FetchError::from(e)
        })?;

        let to_jobs = |values: Vec<serde_json::Value>| -> Vec<BuildJob> {
            decode_each::<RawBuildJob>(values, "build job")
                .into_iter()
                .map(BuildJob::from)
                .collect()
        };

        Ok(ActiveBuildSet {
            currently_running: to_jobs(raw.currently_running),
            queued: to_jobs(raw.queued),
        })
    }
}
