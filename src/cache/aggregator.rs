//! Read-side entry point for the release tracker
//!
//! [`ReleaseCache`] owns one cache per resource kind and is the only thing a
//! consumer talks to. Every read returns a [`Lookup`]; upstream failures
//! show up in [`Lookup::error`] and never as an `Err` or a panic.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::warn;

use crate::cache::cell::{CacheCell, CacheStatus, Lookup};
use crate::cache::keyed::KeyedCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, Config, ConfigError, PAGINATED_TIMEOUT_FACTOR};
use crate::upstream::{
    ActiveBuildSet, Comment, FeedClient, GitHubClient, GitHubRelease, HttpFeedClient,
    HttpGitHubClient, PullRequest, Release, RepoRef, Repositories,
};
use crate::version::{compare_descending, rank};

/// Cache key for GitHub releases: the same tag may exist in both repositories
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseKey {
    pub repo: RepoRef,
    pub tag: String,
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repo, self.tag)
    }
}

pub struct ReleaseCache {
    feed: Arc<dyn FeedClient>,
    github: Arc<dyn GitHubClient>,
    repositories: Repositories,
    releases: CacheCell<Vec<Release>>,
    active_builds: CacheCell<ActiveBuildSet>,
    github_releases: KeyedCache<ReleaseKey, Option<GitHubRelease>>,
    pull_requests: KeyedCache<u64, Option<PullRequest>>,
    comments: KeyedCache<u64, Vec<Comment>>,
    recent_pull_requests: KeyedCache<usize, Vec<PullRequest>>,
}

impl ReleaseCache {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        github: Arc<dyn GitHubClient>,
        repositories: Repositories,
        cache_config: &CacheConfig,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Comment and PR listings walk several pages per refresh
        let paginated_timeout = timeout.saturating_mul(PAGINATED_TIMEOUT_FACTOR);

        Self {
            feed,
            github,
            repositories,
            releases: CacheCell::new(
                "releases",
                cache_config.releases.policy(timeout),
                Arc::clone(&clock),
            ),
            active_builds: CacheCell::new(
                "active builds",
                cache_config.active_builds.policy(timeout),
                Arc::clone(&clock),
            ),
            github_releases: KeyedCache::new(
                "github release",
                cache_config.github_releases.policy(timeout),
                Arc::clone(&clock),
            ),
            pull_requests: KeyedCache::new(
                "pull request",
                cache_config.pull_requests.policy(timeout),
                Arc::clone(&clock),
            ),
            comments: KeyedCache::new(
                "pull request comments",
                cache_config.comments.policy(paginated_timeout),
                Arc::clone(&clock),
            ),
            recent_pull_requests: KeyedCache::new(
                "recent pull requests",
                cache_config.recent_pull_requests.policy(paginated_timeout),
                clock,
            ),
        }
    }

    /// Build the cache over the HTTP clients described by `config`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let feed = HttpFeedClient::new(&config.upstream)?;
        let github = HttpGitHubClient::new(&config.upstream)?;
        Ok(Self::new(
            Arc::new(feed),
            Arc::new(github),
            Repositories::from_config(&config.upstream),
            &config.cache,
            config.upstream.timeout(),
            Arc::new(SystemClock),
        ))
    }

    /// Every known release, most stable and newest first
    pub async fn get_releases_or_update(&self) -> Lookup<Vec<Release>> {
        let feed = Arc::clone(&self.feed);
        self.releases
            .get_or_refresh(move || async move {
                feed.fetch_release_index().await.map(normalize_releases)
            })
            .await
    }

    pub async fn get_active_releases_or_update(&self) -> Lookup<ActiveBuildSet> {
        let feed = Arc::clone(&self.feed);
        self.active_builds
            .get_or_refresh(move || async move { feed.fetch_active_builds().await })
            .await
    }

    /// Release notes for `tag`, looked up in the nightly repository for nightly tags
    pub async fn get_github_release(&self, tag: &str) -> Lookup<Option<GitHubRelease>> {
        let key = ReleaseKey {
            repo: self.repositories.for_tag(tag).clone(),
            tag: tag.to_string(),
        };
        let github = Arc::clone(&self.github);
        let target = key.clone();
        self.github_releases
            .get_or_refresh(&key, move || async move {
                github
                    .fetch_release(&target.repo.owner, &target.repo.name, &target.tag)
                    .await
            })
            .await
    }

    pub async fn get_pr(&self, number: u64) -> Lookup<Option<PullRequest>> {
        let github = Arc::clone(&self.github);
        self.pull_requests
            .get_or_refresh(&number, move || async move {
                github.fetch_pull_request(number).await
            })
            .await
    }

    pub async fn get_pr_comments(&self, number: u64) -> Lookup<Vec<Comment>> {
        let github = Arc::clone(&self.github);
        self.comments
            .get_or_refresh(&number, move || async move {
                github.fetch_pull_request_comments(number).await
            })
            .await
    }

    pub async fn get_recent_prs(&self, limit: usize) -> Lookup<Vec<PullRequest>> {
        let github = Arc::clone(&self.github);
        self.recent_pull_requests
            .get_or_refresh(&limit, move || async move {
                github.fetch_recent_merged_pull_requests(limit).await
            })
            .await
    }

    /// Snapshot of every cache entry, for diagnostics
    pub fn status(&self) -> Vec<CacheStatus> {
        let mut statuses = vec![self.releases.status(None), self.active_builds.status(None)];
        statuses.extend(self.github_releases.status());
        statuses.extend(self.pull_requests.status());
        statuses.extend(self.comments.status());
        statuses.extend(self.recent_pull_requests.status());
        statuses
    }
}

/// Deduplicate by version (last record wins) and sort descending by rank
pub fn normalize_releases(releases: Vec<Release>) -> Vec<Release> {
    let mut by_version: IndexMap<String, Release> = IndexMap::with_capacity(releases.len());
    for release in releases {
        by_version.insert(release.version.clone(), release);
    }

    for version in by_version.keys() {
        if rank(version).is_lossy() {
            warn!("Release version {:?} does not parse cleanly", version);
        }
    }

    let mut sorted: Vec<Release> = by_version.into_values().collect();
    sorted.sort_by(|a, b| compare_descending(&a.version, &b.version));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FetchError;
    use crate::upstream::client::{MockFeedClient, MockGitHubClient};
    use chrono::NaiveDate;
    use futures::future::join_all;

    fn release(version: &str, date: &str) -> Release {
        Release {
            version: version.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            chrome: String::new(),
            node: String::new(),
        }
    }

    fn github_release(tag: &str) -> GitHubRelease {
        GitHubRelease {
            tag: tag.to_string(),
            body_markdown: "Release notes".to_string(),
            published_at: None,
            html_url: format!("https://github.com/electron/electron/releases/tag/{}", tag),
            author_login: Some("testuser".to_string()),
        }
    }

    fn pull(number: u64) -> PullRequest {
        PullRequest {
            number,
            title: "Test PR".to_string(),
            body_markdown: "PR description".to_string(),
            author_login: Some("testuser".to_string()),
            html_url: format!("https://github.com/electron/electron/pull/{}", number),
            created_at: None,
            updated_at: None,
            merged_at: None,
            base_ref: "main".to_string(),
            head_ref: "feature-branch".to_string(),
            head_sha: "abc123".to_string(),
        }
    }

    fn cache_with(feed: MockFeedClient, github: MockGitHubClient) -> ReleaseCache {
        ReleaseCache::new(
            Arc::new(feed),
            Arc::new(github),
            Repositories::from_config(&crate::config::UpstreamConfig::default()),
            &CacheConfig::default(),
            Duration::from_secs(5),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn get_releases_or_update_sorts_feed_descending() {
        let mut feed = MockFeedClient::new();
        feed.expect_fetch_release_index().times(1).returning(|| {
            Ok(vec![
                release("9.0.0", "2022-01-01"),
                release("10.0.0", "2022-01-02"),
            ])
        });

        let cache = cache_with(feed, MockGitHubClient::new());
        let lookup = cache.get_releases_or_update().await;

        assert_eq!(
            *lookup.value,
            vec![
                release("10.0.0", "2022-01-02"),
                release("9.0.0", "2022-01-01")
            ]
        );
        assert!(lookup.error.is_none());
    }

    #[tokio::test]
    async fn get_releases_or_update_returns_empty_on_cold_failure() {
        let mut feed = MockFeedClient::new();
        feed.expect_fetch_release_index()
            .times(1)
            .returning(|| Err(FetchError::Transport("Network error".to_string())));

        let cache = cache_with(feed, MockGitHubClient::new());
        let lookup = cache.get_releases_or_update().await;

        assert!(lookup.value.is_empty());
        assert!(lookup.is_degraded());
    }

    #[tokio::test]
    async fn concurrent_release_reads_fetch_feed_once() {
        let mut feed = MockFeedClient::new();
        feed.expect_fetch_release_index()
            .times(1)
            .returning(|| Ok(vec![release("10.0.0", "2022-01-02")]));

        let cache = cache_with(feed, MockGitHubClient::new());
        let lookups = join_all((0..8).map(|_| cache.get_releases_or_update())).await;

        assert!(lookups.iter().all(|l| l.value.len() == 1));
    }

    #[tokio::test]
    async fn get_active_releases_or_update_degrades_to_empty_set() {
        let mut feed = MockFeedClient::new();
        feed.expect_fetch_active_builds()
            .times(1)
            .returning(|| Err(FetchError::Timeout));

        let cache = cache_with(feed, MockGitHubClient::new());
        let lookup = cache.get_active_releases_or_update().await;

        assert!(lookup.value.is_empty());
        assert_eq!(lookup.error, Some(FetchError::Timeout));
    }

    #[tokio::test]
    async fn get_github_release_routes_stable_tag_to_main_repository() {
        let mut github = MockGitHubClient::new();
        github
            .expect_fetch_release()
            .withf(|owner, repo, tag| owner == "electron" && repo == "electron" && tag == "v10.0.0")
            .times(1)
            .returning(|_, _, tag| Ok(Some(github_release(tag))));

        let cache = cache_with(MockFeedClient::new(), github);
        let lookup = cache.get_github_release("v10.0.0").await;

        assert_eq!(lookup.value().as_ref().map(|r| r.tag.as_str()), Some("v10.0.0"));
    }

    #[tokio::test]
    async fn get_github_release_routes_nightly_tag_to_nightly_repository() {
        let mut github = MockGitHubClient::new();
        github
            .expect_fetch_release()
            .withf(|owner, repo, tag| {
                owner == "electron" && repo == "nightlies" && tag == "v10.0.0-nightly.20220101"
            })
            .times(1)
            .returning(|_, _, tag| Ok(Some(github_release(tag))));

        let cache = cache_with(MockFeedClient::new(), github);
        let lookup = cache.get_github_release("v10.0.0-nightly.20220101").await;

        assert!(lookup.value.is_some());
    }

    #[tokio::test]
    async fn missing_github_release_is_absent_not_an_error() {
        let mut github = MockGitHubClient::new();
        github
            .expect_fetch_release()
            .times(1)
            .returning(|_, _, _| Ok(None));

        let cache = cache_with(MockFeedClient::new(), github);
        let first = cache.get_github_release("v999.0.0").await;
        let second = cache.get_github_release("v999.0.0").await;

        assert!(first.value.is_none());
        assert!(first.error.is_none());
        assert!(second.value.is_none());
        assert!(!second.is_stale);
    }

    #[tokio::test]
    async fn pull_request_and_comments_are_cached_per_number() {
        let mut github = MockGitHubClient::new();
        github
            .expect_fetch_pull_request()
            .withf(|number| *number == 123)
            .times(1)
            .returning(|number| Ok(Some(pull(number))));
        github
            .expect_fetch_pull_request_comments()
            .withf(|number| *number == 123)
            .times(1)
            .returning(|_| {
                Ok(vec![Comment {
                    body_markdown: "Test comment".to_string(),
                    author_login: Some("testuser".to_string()),
                    created_at: None,
                }])
            });

        let cache = cache_with(MockFeedClient::new(), github);
        for _ in 0..2 {
            let pr = cache.get_pr(123).await;
            let comments = cache.get_pr_comments(123).await;
            assert_eq!(pr.value().as_ref().map(|p| p.number), Some(123));
            assert_eq!(comments.value.len(), 1);
        }
    }

    #[tokio::test]
    async fn recent_prs_are_cached_per_limit() {
        let mut github = MockGitHubClient::new();
        github
            .expect_fetch_recent_merged_pull_requests()
            .times(2)
            .returning(|limit| Ok((1..=limit as u64).map(pull).collect()));

        let cache = cache_with(MockFeedClient::new(), github);
        assert_eq!(cache.get_recent_prs(2).await.value.len(), 2);
        assert_eq!(cache.get_recent_prs(5).await.value.len(), 5);
        assert_eq!(cache.get_recent_prs(2).await.value.len(), 2);
    }

    #[tokio::test]
    async fn status_reports_every_populated_entry() {
        let mut github = MockGitHubClient::new();
        github
            .expect_fetch_pull_request()
            .returning(|_| Err(FetchError::RateLimited {
                retry_after_secs: Some(30),
            }));

        let cache = cache_with(MockFeedClient::new(), github);
        cache.get_pr(7).await;

        let statuses = cache.status();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].kind, "releases");
        assert!(statuses[0].fetched_at.is_none());
        let pr = statuses.iter().find(|s| s.kind == "pull request").unwrap();
        assert_eq!(pr.key.as_deref(), Some("7"));
        assert!(pr.last_error.as_deref().unwrap().contains("Rate limited"));
    }

    #[test]
    fn normalize_releases_keeps_last_duplicate() {
        let mut first = release("10.0.0", "2022-01-01");
        first.chrome = "old".to_string();
        let mut second = release("10.0.0", "2022-01-01");
        second.chrome = "new".to_string();

        let normalized = normalize_releases(vec![first, release("9.0.0", "2021-01-01"), second]);

        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].version, "10.0.0");
        assert_eq!(normalized[0].chrome, "new");
    }

    #[test]
    fn normalize_releases_is_idempotent() {
        let input = vec![
            release("9.0.0-beta.1", "2022-01-01"),
            release("10.0.0", "2022-01-01"),
            release("9.0.0-nightly.20220101", "2022-01-01"),
            release("9.0.0", "2021-12-01"),
        ];

        let once = normalize_releases(input.clone());
        let twice = normalize_releases(once.clone());

        assert_eq!(once, twice);
        let versions: Vec<&str> = once.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(
            versions,
            vec!["10.0.0", "9.0.0", "9.0.0-beta.1", "9.0.0-nightly.20220101"]
        );
    }
}
