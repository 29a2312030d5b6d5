use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};

use release_tracker::boundary::{Posture, guard};
use release_tracker::cache::{Lookup, ReleaseCache};
use release_tracker::config::{Config, log_path};
use release_tracker::format::{minutes_since, time_since};
use release_tracker::logging::{self, LOG_FILTER_ENV};
use release_tracker::upstream::{
    ActiveBuildSet, BuildJob, Comment, GitHubRelease, PullRequest, Release,
};

#[derive(Parser)]
#[command(name = "release-tracker")]
#[command(version, about = "Cached view of Electron releases, builds and pull requests")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Every known release, newest and most stable first
    Releases {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Release builds running or queued right now
    Active,
    /// GitHub release notes for a tag
    Release { tag: String },
    /// A single pull request
    Pr { number: u64 },
    /// Comments on a pull request
    Comments { number: u64 },
    /// Most recently merged pull requests
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Freshness of every cache entry
    Status,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Response<T> {
    data: T,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> Response<T> {
    fn from_lookup<U>(lookup: &Lookup<U>, data: T) -> Self {
        Self {
            data,
            stale: lookup.is_stale,
            error: lookup.error.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseView<'a> {
    #[serde(flatten)]
    release: &'a Release,
    released: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildJobView<'a> {
    #[serde(flatten)]
    job: &'a BuildJob,
    started: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveBuildsView<'a> {
    currently_running: Vec<BuildJobView<'a>>,
    queued: Vec<BuildJobView<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GitHubReleaseView<'a> {
    #[serde(flatten)]
    release: &'a GitHubRelease,
    published: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestView<'a> {
    #[serde(flatten)]
    pull_request: &'a PullRequest,
    updated: Option<String>,
    merged: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentView<'a> {
    #[serde(flatten)]
    comment: &'a Comment,
    posted: Option<String>,
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn release_view(release: &Release, now: DateTime<Utc>) -> ReleaseView<'_> {
    ReleaseView {
        release,
        released: time_since(midnight(release.date), now),
    }
}

fn build_views(jobs: &[BuildJob], now: DateTime<Utc>) -> Vec<BuildJobView<'_>> {
    jobs.iter()
        .map(|job| BuildJobView {
            job,
            started: minutes_since(job.started_at, now),
        })
        .collect()
}

fn active_view(builds: &ActiveBuildSet, now: DateTime<Utc>) -> ActiveBuildsView<'_> {
    ActiveBuildsView {
        currently_running: build_views(&builds.currently_running, now),
        queued: build_views(&builds.queued, now),
    }
}

fn pull_request_view(pull_request: &PullRequest, now: DateTime<Utc>) -> PullRequestView<'_> {
    PullRequestView {
        pull_request,
        updated: pull_request.updated_at.map(|t| time_since(t, now)),
        merged: pull_request.merged_at.map(|t| time_since(t, now)),
    }
}

fn not_found() -> Value {
    json!({ "notFound": true })
}

/// Absent resource with no upstream error behind it
fn is_not_found<T>(lookup: &Lookup<Option<T>>) -> bool {
    lookup.value().is_none() && lookup.error.is_none()
}

async fn run(command: Command, config: Config) -> anyhow::Result<Value> {
    let cache = ReleaseCache::from_config(&config).context("Failed to set up upstream clients")?;
    let now = Utc::now();

    let value = match command {
        Command::Releases { limit } => {
            let lookup = cache.get_releases_or_update().await;
            let releases: Vec<ReleaseView<'_>> = lookup
                .value()
                .iter()
                .take(limit.unwrap_or(usize::MAX))
                .map(|r| release_view(r, now))
                .collect();
            serde_json::to_value(Response::from_lookup(&lookup, releases))?
        }
        Command::Active => {
            let lookup = cache.get_active_releases_or_update().await;
            serde_json::to_value(Response::from_lookup(
                &lookup,
                active_view(lookup.value(), now),
            ))?
        }
        Command::Release { tag } => {
            let lookup = cache.get_github_release(&tag).await;
            if is_not_found(&lookup) {
                return Ok(not_found());
            }
            let view = lookup.value().as_ref().map(|release| GitHubReleaseView {
                release,
                published: release.published_at.map(|t| time_since(t, now)),
            });
            serde_json::to_value(Response::from_lookup(&lookup, view))?
        }
        Command::Pr { number } => {
            let lookup = cache.get_pr(number).await;
            if is_not_found(&lookup) {
                return Ok(not_found());
            }
            let view = lookup
                .value()
                .as_ref()
                .map(|pr| pull_request_view(pr, now));
            serde_json::to_value(Response::from_lookup(&lookup, view))?
        }
        Command::Comments { number } => {
            let lookup = cache.get_pr_comments(number).await;
            let comments: Vec<CommentView<'_>> = lookup
                .value()
                .iter()
                .map(|comment| CommentView {
                    comment,
                    posted: comment.created_at.map(|t| minutes_since(t, now)),
                })
                .collect();
            serde_json::to_value(Response::from_lookup(&lookup, comments))?
        }
        Command::Recent { limit } => {
            let lookup = cache.get_recent_prs(limit).await;
            let pull_requests: Vec<PullRequestView<'_>> = lookup
                .value()
                .iter()
                .map(|pr| pull_request_view(pr, now))
                .collect();
            serde_json::to_value(Response::from_lookup(&lookup, pull_requests))?
        }
        Command::Status => serde_json::to_value(cache.status())?,
    };

    Ok(value)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = logging::resolve_filter(std::env::var(LOG_FILTER_ENV).ok());
    let _log_guard = match logging::init(&log_path(), &filter) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {:#}", e);
            None
        }
    };

    let posture = Posture::from_env();
    let outcome = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(guard(posture, async {
            let config = Config::load(cli.config.as_deref())?;
            run(cli.command, config).await
        }));

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(ExitCode::FAILURE)
        }
    }
}
