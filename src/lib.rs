pub mod boundary;
pub mod cache;
pub mod clock;
pub mod config;
pub mod format;
pub mod logging;
pub mod upstream;
pub mod version;
