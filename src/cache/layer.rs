//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::QueryKey;
use super::store::QueryCache;
use super::traits::CacheResult;
use crate::error::ApiError;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network client. Mutations
/// share the same [`QueryCache`] through [`QueryClient::cache`], which is how
/// optimistic writes become visible to readers.
pub struct QueryClient {
  cache: Arc<QueryCache>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl QueryClient {
  /// Create a new cache layer over the given cache.
  pub fn new(cache: Arc<QueryCache>) -> Self {
    Self {
      cache,
      stale_time: Duration::minutes(5),
    }
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn cache(&self) -> &Arc<QueryCache> {
    &self.cache
  }

  /// Read a cached value, treating undecodable data as a miss.
  fn cached<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
    match self.cache.read(key) {
      Ok(value) => value,
      Err(e) => {
        warn!(key = %key, error = %e, "ignoring unreadable cache entry");
        None
      }
    }
  }

  /// Fetch a query with a cache-first strategy.
  ///
  /// 1. Check cache - if present, not invalidated and younger than the stale
  ///    time, return immediately
  /// 2. Otherwise fetch from network under a fetch ticket
  /// 3. If a write landed while the fetch was in flight, keep the newer cached
  ///    value and drop the response
  /// 4. On network failure, return the cached value (offline mode)
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CacheResult<T>, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let status = self.cache.status(key);
    if let Some(status) = status {
      let expired = Utc::now() - status.written_at > self.stale_time;
      if !status.stale && !expired {
        if let Some(data) = self.cached(key) {
          return Ok(CacheResult::from_cache(data, false));
        }
      }
    }

    let ticket = self.cache.begin_fetch(key);
    debug!(key = %key, "fetching from network");

    match fetcher().await {
      Ok(data) => match self.cache.complete_fetch(ticket, &data) {
        Ok(true) => Ok(CacheResult::from_network(data)),
        Ok(false) => {
          // Superseded by a newer write, serve that instead
          match self.cached(key) {
            Some(cached) => Ok(CacheResult::from_cache(cached, true)),
            None => Ok(CacheResult::from_network(data)),
          }
        }
        Err(e) => {
          warn!(key = %key, error = %e, "failed to cache fetch result");
          Ok(CacheResult::from_network(data))
        }
      },
      Err(e) => {
        match self.cached(key) {
          Some(data) => {
            warn!(key = %key, error = %e, "network failed, serving cached data");
            Ok(CacheResult::offline(data))
          }
          None => Err(e),
        }
      }
    }
  }

  /// Mark a key stale without fetching.
  pub fn invalidate(&self, key: &QueryKey) {
    self.cache.invalidate(key);
  }
}

impl Clone for QueryClient {
  fn clone(&self) -> Self {
    Self {
      cache: Arc::clone(&self.cache),
      stale_time: self.stale_time,
    }
  }
}
