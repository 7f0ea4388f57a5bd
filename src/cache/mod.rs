//! Client-side query cache.
//!
//! This module provides the in-memory cache every view reads through:
//! - One entry per [`QueryKey`], replaced wholesale on write
//! - Invalidation marks entries stale, the next fetch goes to the network
//! - Fetches are tagged with a generation so a late response never clobbers
//!   a newer (possibly optimistic) write
//! - Basic offline mode (serve cached data when the network is unavailable)

mod key;
mod layer;
mod store;
mod traits;

pub use key::QueryKey;
pub use layer::QueryClient;
pub use store::{CacheEvent, QueryCache};
pub use traits::{CacheResult, CacheSource, Cacheable};
