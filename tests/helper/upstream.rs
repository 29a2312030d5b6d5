//! Upstream test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use release_tracker::cache::ReleaseCache;
use release_tracker::clock::Clock;
use release_tracker::config::{CacheConfig, CachePolicyConfig};
use release_tracker::upstream::{
    ActiveBuildSet, Comment, FeedClient, FetchError, GitHubClient, GitHubRelease, PullRequest,
    Release, RepoRef, Repositories,
};

pub fn release(version: &str, date: &str) -> Release {
    Release {
        version: version.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        chrome: String::new(),
        node: String::new(),
    }
}

/// Fake release feed that counts fetches
///
/// Responses are consumed in order; the last one repeats once the queue is
/// down to a single entry.
pub struct FakeFeed {
    responses: Mutex<Vec<Result<Vec<Release>, FetchError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeFeed {
    pub fn new(responses: Vec<Result<Vec<Release>, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<Vec<Release>, FetchError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn fetch_release_index(&self) -> Result<Vec<Release>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next_response()
    }

    async fn fetch_active_builds(&self) -> Result<ActiveBuildSet, FetchError> {
        Ok(ActiveBuildSet::default())
    }
}

/// Fake GitHub API that records which repository each release lookup hit
#[derive(Default)]
pub struct FakeGitHub {
    releases: HashMap<(String, String), GitHubRelease>,
    release_lookups: Mutex<Vec<String>>,
    delay: Duration,
}

impl FakeGitHub {
    /// Delay every pull request and comment response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    pub fn with_release(mut self, repo: &str, tag: &str) -> Self {
        self.releases.insert(
            (repo.to_string(), tag.to_string()),
            GitHubRelease {
                tag: tag.to_string(),
                body_markdown: format!("Notes for {}", tag),
                published_at: None,
                html_url: format!("https://github.com/{}/releases/tag/{}", repo, tag),
                author_login: None,
            },
        );
        self
    }

    pub fn release_lookups(&self) -> Vec<String> {
        self.release_lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitHubClient for FakeGitHub {
    async fn fetch_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<GitHubRelease>, FetchError> {
        let repo = format!("{}/{}", owner, repo);
        self.release_lookups.lock().unwrap().push(repo.clone());
        Ok(self.releases.get(&(repo, tag.to_string())).cloned())
    }

    async fn fetch_pull_request(&self, _number: u64) -> Result<Option<PullRequest>, FetchError> {
        self.wait().await;
        Ok(None)
    }

    async fn fetch_pull_request_comments(&self, number: u64) -> Result<Vec<Comment>, FetchError> {
        self.wait().await;
        Ok(vec![Comment {
            body_markdown: format!("Looks good to me, #{}", number),
            author_login: Some("reviewer".to_string()),
            created_at: None,
        }])
    }

    async fn fetch_recent_merged_pull_requests(
        &self,
        _limit: usize,
    ) -> Result<Vec<PullRequest>, FetchError> {
        Ok(Vec::new())
    }
}

pub fn cache_config(ttl_seconds: u64, stale_while_revalidate: bool) -> CacheConfig {
    let policy = CachePolicyConfig::new(ttl_seconds, stale_while_revalidate);
    CacheConfig {
        releases: policy,
        active_builds: policy,
        github_releases: policy,
        pull_requests: policy,
        comments: policy,
        recent_pull_requests: policy,
    }
}

/// Create a release cache over fake clients with the default Electron repositories
pub fn create_test_cache(
    feed: Arc<FakeFeed>,
    github: Arc<FakeGitHub>,
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> ReleaseCache {
    ReleaseCache::new(
        feed,
        github,
        Repositories {
            main: RepoRef::new("electron", "electron"),
            nightly: RepoRef::new("electron", "nightlies"),
        },
        config,
        Duration::from_secs(5),
        clock,
    )
}
