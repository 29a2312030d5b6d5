//! Single-flight cache cell
//!
//! A [`CacheCell`] holds one value and decides, on every read, whether the
//! stored value can be served or a refresh is due. At most one refresh runs
//! per cell; every concurrent reader joins it (or, under
//! stale-while-revalidate, takes the previous value and moves on). The
//! refresh runs on its own task so it completes even if every reader goes
//! away.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::upstream::FetchError;

/// Freshness rules for one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a fetched value is served without refreshing
    pub ttl: Duration,
    /// Serve the previous value while a refresh is in flight
    pub stale_while_revalidate: bool,
    /// Upper bound on a single refresh
    pub timeout: Duration,
}

/// Result of a cache read
///
/// `error` is set when the last refresh failed; `value` is then the previous
/// value, or `T::default()` if there never was one.
#[derive(Debug)]
pub struct Lookup<T> {
    pub value: Arc<T>,
    pub is_stale: bool,
    pub error: Option<FetchError>,
}

impl<T> Clone for Lookup<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            is_stale: self.is_stale,
            error: self.error.clone(),
        }
    }
}

impl<T> Lookup<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> Arc<T> {
        self.value
    }

    /// Whether the value comes from a failed refresh
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Diagnostic snapshot of one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub refreshing: bool,
    pub last_error: Option<String>,
}

struct CacheEntry<T> {
    value: Arc<T>,
    /// `None` for a placeholder created by a failed cold fetch
    fetched_at: Option<DateTime<Utc>>,
    error: Option<FetchError>,
}

impl<T> CacheEntry<T> {
    fn lookup(&self, is_stale: bool) -> Lookup<T> {
        Lookup {
            value: Arc::clone(&self.value),
            is_stale,
            error: self.error.clone(),
        }
    }
}

enum RefreshOutcome<T> {
    Done(Lookup<T>),
    Panicked(Arc<str>),
}

impl<T> Clone for RefreshOutcome<T> {
    fn clone(&self) -> Self {
        match self {
            RefreshOutcome::Done(lookup) => RefreshOutcome::Done(lookup.clone()),
            RefreshOutcome::Panicked(message) => RefreshOutcome::Panicked(Arc::clone(message)),
        }
    }
}

type InFlight<T> = Shared<BoxFuture<'static, RefreshOutcome<T>>>;

struct CellState<T> {
    entry: Option<CacheEntry<T>>,
    in_flight: Option<InFlight<T>>,
}

fn lock<T>(state: &Mutex<CellState<T>>) -> MutexGuard<'_, CellState<T>> {
    // Entries are only ever replaced whole, so a poisoned lock still guards
    // a consistent state
    state.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct CacheCell<T> {
    kind: &'static str,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CellState<T>>>,
}

impl<T> CacheCell<T>
where
    T: Default + Send + Sync + 'static,
{
    pub fn new(kind: &'static str, policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            policy,
            clock,
            state: Arc::new(Mutex::new(CellState {
                entry: None,
                in_flight: None,
            })),
        }
    }

    /// Serve the cached value, refreshing it first when it is missing or expired
    ///
    /// `fetch` is only called when this read starts a new refresh. Fetch
    /// failures never surface as a panic or `Err`; they come back in
    /// [`Lookup::error`] next to the best value available. A panic inside the
    /// fetch is re-raised in every reader waiting on that refresh.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Lookup<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let in_flight = {
            let mut state = lock(&self.state);

            if let Some(entry) = &state.entry
                && self.is_fresh(entry)
            {
                debug!("{} cache hit", self.kind);
                return entry.lookup(false);
            }

            let in_flight = match &state.in_flight {
                Some(in_flight) => {
                    debug!("{} refresh already in flight, joining", self.kind);
                    in_flight.clone()
                }
                None => {
                    let in_flight = self.start_refresh(fetch());
                    state.in_flight = Some(in_flight.clone());
                    in_flight
                }
            };

            // A placeholder left by a failed cold fetch is not a previous value
            if self.policy.stale_while_revalidate
                && let Some(entry) = &state.entry
                && entry.fetched_at.is_some()
            {
                debug!("{} serving stale value during refresh", self.kind);
                return entry.lookup(true);
            }

            in_flight
        };

        match in_flight.await {
            RefreshOutcome::Done(lookup) => lookup,
            RefreshOutcome::Panicked(message) => {
                panic!("{} refresh panicked: {}", self.kind, message)
            }
        }
    }

    /// The stored value without triggering a refresh
    pub fn peek(&self) -> Option<Lookup<T>> {
        let state = lock(&self.state);
        state
            .entry
            .as_ref()
            .map(|entry| entry.lookup(!self.is_fresh(entry)))
    }

    pub fn status(&self, key: Option<String>) -> CacheStatus {
        let state = lock(&self.state);
        let entry = state.entry.as_ref();
        CacheStatus {
            kind: self.kind,
            key,
            fetched_at: entry.and_then(|e| e.fetched_at),
            refreshing: state.in_flight.is_some(),
            last_error: entry.and_then(|e| e.error.as_ref()).map(|e| e.to_string()),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<T>) -> bool {
        let Some(fetched_at) = entry.fetched_at else {
            return false;
        };
        match (self.clock.now() - fetched_at).to_std() {
            Ok(age) => age < self.policy.ttl,
            // Clock moved backwards; the value cannot be older than the ttl
            Err(_) => true,
        }
    }

    fn start_refresh<Fut>(&self, fetch: Fut) -> InFlight<T>
    where
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        info!("Refreshing {}", self.kind);

        let kind = self.kind;
        let timeout = self.policy.timeout;
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let result = AssertUnwindSafe(tokio::time::timeout(timeout, fetch))
                .catch_unwind()
                .await;

            let mut state = lock(&state);
            state.in_flight = None;

            match result {
                Ok(Ok(Ok(value))) => {
                    info!("Refreshed {}", kind);
                    let entry = CacheEntry {
                        value: Arc::new(value),
                        fetched_at: Some(clock.now()),
                        error: None,
                    };
                    let lookup = entry.lookup(false);
                    state.entry = Some(entry);
                    RefreshOutcome::Done(lookup)
                }
                Ok(Ok(Err(e))) => RefreshOutcome::Done(record_failure(&mut state, kind, e)),
                Ok(Err(_elapsed)) => {
                    RefreshOutcome::Done(record_failure(&mut state, kind, FetchError::Timeout))
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Refreshing {} panicked: {}", kind, message);
                    RefreshOutcome::Panicked(Arc::from(message))
                }
            }
        });

        let state = Arc::clone(&self.state);
        task.map(move |joined| {
            joined.unwrap_or_else(|e| {
                // Only reachable when the runtime drops the task before it finishes
                lock(&state).in_flight = None;
                RefreshOutcome::Panicked(Arc::from(e.to_string()))
            })
        })
        .boxed()
        .shared()
    }
}

fn record_failure<T: Default>(
    state: &mut CellState<T>,
    kind: &'static str,
    error: FetchError,
) -> Lookup<T> {
    warn!("Refreshing {} failed, keeping previous value: {}", kind, error);
    let entry = state.entry.get_or_insert_with(|| CacheEntry {
        value: Arc::new(T::default()),
        fetched_at: None,
        error: None,
    });
    entry.error = Some(error);
    entry.lookup(true)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
