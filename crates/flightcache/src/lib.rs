//! A single-flight memoizing cache for asynchronous lookups.
//!
//! The [`CoalescingCache`] makes sure that concurrent lookups of the same key share a single
//! running computation, and keeps successfully computed values around until the underlying
//! [`CacheStore`] evicts them.
//!
//! ```no_run
//! # async fn fetch(url: &str) -> Result<String, String> { Ok(url.into()) }
//! # async fn example() -> Result<(), String> {
//! use flightcache::CoalescingCache;
//!
//! let cache = CoalescingCache::<String, String, String>::bounded("details", 1_000);
//!
//! let url = "https://example.com/detail.geojson".to_owned();
//! let detail = cache
//!     .resolve(url.clone(), move || async move { fetch(&url).await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
pub mod metrics;

mod cache;
pub mod config;
mod entry;
pub mod logging;
pub mod store;
mod utils;

pub use cache::CoalescingCache;
pub use entry::{CacheEntry, Generation, InFlight, Resolved};
pub use store::{BoundedStore, CacheStore, LocalStore, Lookup};
