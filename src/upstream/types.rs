//! Normalized entities returned by the upstream clients
//!
//! These are the shapes the cache stores and hands out. Raw upstream payloads
//! are decoded into private schema structs inside each adapter and converted
//! into these types there.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::version::{Channel, RankKey, rank};

/// One entry of the Electron release index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub version: String,
    pub date: NaiveDate,
    pub chrome: String,
    pub node: String,
}

impl Release {
    pub fn rank(&self) -> RankKey {
        rank(&self.version)
    }

    pub fn channel(&self) -> Channel {
        Channel::of(&self.version)
    }
}

/// A release build that is running or waiting on the build infrastructure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub id: String,
    pub branch: String,
    pub channel: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of release builds in progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBuildSet {
    pub currently_running: Vec<BuildJob>,
    pub queued: Vec<BuildJob>,
}

impl ActiveBuildSet {
    pub fn is_empty(&self) -> bool {
        self.currently_running.is_empty() && self.queued.is_empty()
    }
}

/// Release notes published on GitHub for a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubRelease {
    pub tag: String,
    pub body_markdown: String,
    pub published_at: Option<DateTime<Utc>>,
    pub html_url: String,
    pub author_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body_markdown: String,
    pub author_login: Option<String>,
    pub html_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub base_ref: String,
    pub head_ref: String,
    pub head_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub body_markdown: String,
    pub author_login: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
