//! GitHub REST API client implementation

use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{ConfigError, UpstreamConfig};
use crate::upstream::client::GitHubClient;
use crate::upstream::error::FetchError;
use crate::upstream::http::{build_client, ensure_success};
use crate::upstream::types::{Comment, GitHubRelease, PullRequest};

const GITHUB_API_VERSION: &str = "2022-11-28";

/// Largest page GitHub serves for list endpoints
const PER_PAGE: usize = 100;

/// Upper bound on pages walked by a single paginated fetch
const MAX_PAGES: usize = 50;

/// A GitHub repository coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Main and nightly repositories
///
/// Stable, beta and alpha releases are published in the main repository;
/// nightly builds are published in a separate one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repositories {
    pub main: RepoRef,
    pub nightly: RepoRef,
}

impl Repositories {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            main: RepoRef::new(&config.owner, &config.repo),
            nightly: RepoRef::new(&config.owner, &config.nightly_repo),
        }
    }

    /// Repository the release for `tag` is published in
    pub fn for_tag(&self, tag: &str) -> &RepoRef {
        if tag.contains("-nightly.") {
            &self.nightly
        } else {
            &self.main
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    author: Option<RawUser>,
}

impl From<RawRelease> for GitHubRelease {
    fn from(raw: RawRelease) -> Self {
        Self {
            tag: raw.tag_name,
            body_markdown: raw.body.unwrap_or_default(),
            published_at: raw.published_at,
            html_url: raw.html_url,
            author_login: raw.author.map(|u| u.login),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawBranch {
    #[serde(rename = "ref", default)]
    ref_name: String,
    #[serde(default)]
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    base: RawBranch,
    #[serde(default)]
    head: RawBranch,
}

impl From<RawPullRequest> for PullRequest {
    fn from(raw: RawPullRequest) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            body_markdown: raw.body.unwrap_or_default(),
            author_login: raw.user.map(|u| u.login),
            html_url: raw.html_url,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            merged_at: raw.merged_at,
            base_ref: raw.base.ref_name,
            head_ref: raw.head.ref_name,
            head_sha: raw.head.sha,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Self {
            body_markdown: raw.body.unwrap_or_default(),
            author_login: raw.user.map(|u| u.login),
            created_at: raw.created_at,
        }
    }
}

/// GitHub client backed by reqwest
///
/// Pull requests are read from the main repository.
pub struct HttpGitHubClient {
    client: reqwest::Client,
    base_url: Url,
    repo: RepoRef,
}

impl HttpGitHubClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        if let Some(token) = &config.github_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ConfigError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            warn!("No GitHub token configured, requests are subject to anonymous rate limits");
        }

        let base_url = Url::parse(&config.github_api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidUrl(config.github_api_url.clone()))?;

        Ok(Self {
            client: build_client(headers, config.timeout())?,
            base_url,
            repo: RepoRef::new(&config.owner, &config.repo),
        })
    }

    /// API URL for `segments`, each percent-encoded as a single path segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn repo_endpoint(&self, repo: &RepoRef, rest: &[&str]) -> Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    /// GET a JSON resource, `Ok(None)` on 404
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<Option<T>, FetchError> {
        let response = self.client.get(url.clone()).query(query).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("GitHub returned 404 for {}", url);
            return Ok(None);
        }

        let response = ensure_success(response)?;
        let value = response.json().await.map_err(|e| {
            warn!("Failed to read GitHub response from {}: {}", url, e);
            FetchError::from(e)
        })?;

        Ok(Some(value))
    }

    /// Walk a paginated list endpoint until a short page or `stop` says enough
    ///
    /// A 404 on the first page means the parent resource does not exist and
    /// yields an empty list. A 404 on a later page is an error.
    async fn get_pages<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
        mut stop: impl FnMut(&[T]) -> bool,
    ) -> Result<Vec<T>, FetchError> {
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut page_query = query.to_vec();
            page_query.push(("per_page", PER_PAGE.to_string()));
            page_query.push(("page", page.to_string()));

            let Some(batch) = self.get_json::<Vec<T>>(url, &page_query).await? else {
                if page == 1 {
                    break;
                }
                warn!("GitHub returned 404 for page {} of {}", page, url);
                return Err(FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                });
            };
            let short_page = batch.len() < PER_PAGE;
            items.extend(batch);

            if short_page || stop(&items) {
                break;
            }
        }

        Ok(items)
    }
}

#[async_trait::async_trait]
impl GitHubClient for HttpGitHubClient {
    async fn fetch_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<GitHubRelease>, FetchError> {
        let url = self.endpoint(&["repos", owner, repo, "releases", "tags", tag]);
        let release: Option<RawRelease> = self.get_json(&url, &[]).await?;
        Ok(release.map(GitHubRelease::from))
    }

    async fn fetch_pull_request(&self, number: u64) -> Result<Option<PullRequest>, FetchError> {
        let number = number.to_string();
        let url = self.repo_endpoint(&self.repo, &["pulls", number.as_str()]);
        let pull: Option<RawPullRequest> = self.get_json(&url, &[]).await?;
        Ok(pull.map(PullRequest::from))
    }

    async fn fetch_pull_request_comments(&self, number: u64) -> Result<Vec<Comment>, FetchError> {
        let number = number.to_string();
        let url = self.repo_endpoint(&self.repo, &["issues", number.as_str(), "comments"]);
        let comments: Vec<RawComment> = self.get_pages(&url, &[], |_| false).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn fetch_recent_merged_pull_requests(
        &self,
        limit: usize,
    ) -> Result<Vec<PullRequest>, FetchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.repo_endpoint(&self.repo, &["pulls"]);
        let query = [
            ("state", "closed".to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
        ];
        let pulls: Vec<RawPullRequest> = self
            .get_pages(&url, &query, |pulls: &[RawPullRequest]| {
                pulls.iter().filter(|p| p.merged_at.is_some()).count() >= limit
            })
            .await?;

        Ok(pulls
            .into_iter()
            .filter(|p| p.merged_at.is_some())
            .take(limit)
            .map(PullRequest::from)
            .collect())
    }
}
