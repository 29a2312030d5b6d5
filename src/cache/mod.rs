//! In-memory caching layer between consumers and the upstream services
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Consumer   │────▶│ ReleaseCache │────▶│  Upstream    │
//! │ (CLI, routes)│     │ (aggregator) │     │ (feed, GH)   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │  CacheCell   │
//!                      │(single-flight│
//!                      └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cell`]: Single-flight cell with ttl and stale-while-revalidate
//! - [`keyed`]: One cell per key (tag, pull request number, limit)
//! - [`aggregator`]: `ReleaseCache`, one cache per resource kind

pub mod aggregator;
pub mod cell;
pub mod keyed;

pub use aggregator::{ReleaseCache, ReleaseKey, normalize_releases};
pub use cell::{CacheCell, CachePolicy, CacheStatus, Lookup};
pub use keyed::KeyedCache;
