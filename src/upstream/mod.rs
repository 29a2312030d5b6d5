//! Upstream services: the Electron release feed and the GitHub API
//!
//! # Modules
//!
//! - [`client`]: `FeedClient` and `GitHubClient` capability traits
//! - [`feed`]: reqwest implementation of the feed client
//! - [`github`]: reqwest implementation of the GitHub client and repository routing
//! - [`http`]: Client construction and status handling shared by both adapters
//! - [`types`]: Normalized entities handed to the cache
//! - [`error`]: `FetchError`

pub mod client;
pub mod error;
pub mod feed;
pub mod github;
pub mod http;
pub mod types;

pub use client::{FeedClient, GitHubClient};
pub use error::FetchError;
pub use feed::HttpFeedClient;
pub use github::{HttpGitHubClient, RepoRef, Repositories};
pub use types::{ActiveBuildSet, BuildJob, Comment, GitHubRelease, PullRequest, Release};
