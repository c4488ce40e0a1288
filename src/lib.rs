//! Squirrel: a filesystem-backed, content-addressed, versioned store
//! for production digital assets.
//!
//! An asset directory holds numbered version directories whose files are
//! symlinks into a per-asset dedup pool, plus per-version metadata
//! sidecars and pin symlinks. Version reservation is race-safe across
//! processes using nothing but `mkdir` as the lock.

pub mod config;
pub mod error;
pub mod logging;
pub mod name;
pub mod store;
pub mod uri;

pub use config::Config;
pub use error::{NameError, Result, StoreError};
pub use store::asset::{Asset, PublishRequest};
pub use store::version::Version;
