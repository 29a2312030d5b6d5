//! Outward error boundary for consumers of the cache
//!
//! [`guard`] runs one consumer request and turns anything that escapes it,
//! an `Err` or a panic, into an [`ErrorPayload`]. How much the payload
//! reveals depends on the [`Posture`]: development builds get the message and
//! a stack, production builds only learn that something failed.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures::FutureExt;
use serde::Serialize;
use tracing::error;

use crate::cache::cell::panic_message;

/// Environment variable selecting the posture
pub const POSTURE_ENV: &str = "RELEASE_TRACKER_ENV";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    Development,
    Production,
}

impl Posture {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(POSTURE_ENV).ok().as_deref())
    }

    /// Anything other than `development` is production
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("development") => Posture::Development,
            _ => Posture::Production,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub stack: String,
}

/// Body returned to a client when a request fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    /// `{"error": {"message": ..., "stack": ...}}`
    Detailed { error: ErrorDetail },
    /// `{"error": true}`
    Opaque { error: bool },
}

impl ErrorPayload {
    pub fn new(posture: Posture, message: String, stack: String) -> Self {
        match posture {
            Posture::Development => ErrorPayload::Detailed {
                error: ErrorDetail { message, stack },
            },
            Posture::Production => ErrorPayload::Opaque { error: true },
        }
    }
}

thread_local! {
    /// Backtrace of the most recent panic on this thread, taken at the panic site
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that records where each panic happened
///
/// The previous hook still runs, so default panic output is unchanged.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Run a consumer request, converting errors and panics into an [`ErrorPayload`]
pub async fn guard<T, Fut>(posture: Posture, request: Fut) -> Result<T, ErrorPayload>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    install_panic_hook();

    match AssertUnwindSafe(request).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!("Request failed: {:#}", err);
            Err(ErrorPayload::new(
                posture,
                err.to_string(),
                format!("{:?}", err),
            ))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Request panicked: {}", message);
            let stack = take_panic_backtrace()
                .unwrap_or_else(|| Backtrace::force_capture().to_string());
            Err(ErrorPayload::new(posture, message, stack))
        }
    }
}
