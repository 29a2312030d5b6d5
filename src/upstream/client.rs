//! Capability traits for the two upstream services

#[cfg(test)]
use mockall::automock;

use crate::upstream::error::FetchError;
use crate::upstream::types::{ActiveBuildSet, Comment, GitHubRelease, PullRequest, Release};

/// Fetches the Electron release feed
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetches the full release index
    ///
    /// # Returns
    /// * `Ok(Vec<Release>)` - Every record that matched the expected schema, in feed order
    /// * `Err(FetchError)` - Transport failure or a non-success status
    async fn fetch_release_index(&self) -> Result<Vec<Release>, FetchError>;

    /// Fetches the release builds currently running or queued
    async fn fetch_active_builds(&self) -> Result<ActiveBuildSet, FetchError>;
}

/// Fetches releases and pull requests from the GitHub API
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait GitHubClient: Send + Sync {
    /// Fetches the release published for `tag` in `owner/repo`
    ///
    /// # Returns
    /// * `Ok(Some(_))` - The release exists
    /// * `Ok(None)` - GitHub reports no such tag
    /// * `Err(FetchError)` - Anything else went wrong
    async fn fetch_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<GitHubRelease>, FetchError>;

    /// Fetches a pull request, `Ok(None)` when it does not exist
    async fn fetch_pull_request(&self, number: u64) -> Result<Option<PullRequest>, FetchError>;

    /// Fetches every comment on a pull request, oldest first
    async fn fetch_pull_request_comments(&self, number: u64) -> Result<Vec<Comment>, FetchError>;

    /// Fetches up to `limit` recently merged pull requests, most recently updated first
    async fn fetch_recent_merged_pull_requests(
        &self,
        limit: usize,
    ) -> Result<Vec<PullRequest>, FetchError>;
}
