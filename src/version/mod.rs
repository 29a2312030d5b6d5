//! Version ranking for Electron release strings
//!
//! # Modules
//!
//! - [`rank`]: Total order over version strings (channel, numeric version, prerelease sequence)

pub mod rank;

pub use rank::{Channel, RankKey, compare_descending, rank};
