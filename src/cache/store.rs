//! In-memory query cache with generation-tagged fetches.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::key::QueryKey;
use crate::error::CacheError;

const EVENT_CAPACITY: usize = 256;

/// Notification sent to cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// The value for a key was replaced (optimistic write, rollback or fetch)
  Written(QueryKey),
  /// The key was marked stale and should be refetched
  Invalidated(QueryKey),
  /// A fetch result arrived after a newer write and was dropped
  FetchDiscarded(QueryKey),
}

/// Handle for an in-flight fetch, used to detect that it was superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
  key: QueryKey,
  generation: u64,
}

/// Metadata about a cached value.
#[derive(Debug, Clone, Copy)]
pub struct EntryStatus {
  pub stale: bool,
  pub written_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Entry {
  value: Option<Value>,
  stale: bool,
  /// Bumped by every write, invalidation and cancel request
  generation: u64,
  written_at: Option<DateTime<Utc>>,
}

impl Entry {
  fn replace(&mut self, value: Option<Value>) {
    self.value = value;
    self.generation += 1;
    self.written_at = Some(Utc::now());
  }
}

/// Session-lifetime cache of server responses keyed by [`QueryKey`].
///
/// Values are held as JSON and decoded on every read, so callers always get
/// their own copy and can only change cached state through `write`,
/// `restore` and `invalidate`. The lock is never held across an await.
pub struct QueryCache {
  entries: Mutex<HashMap<QueryKey, Entry>>,
  events: broadcast::Sender<CacheEvent>,
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new()
  }
}

impl QueryCache {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      entries: Mutex::new(HashMap::new()),
      events,
    }
  }

  /// Subscribe to writes and invalidations.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }

  /// Read and decode the value for `key`.
  pub fn read<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>, CacheError> {
    match self.snapshot(key) {
      Some(value) => serde_json::from_value(value)
        .map(Some)
        .map_err(|source| CacheError::Decode {
          key: key.to_string(),
          source,
        }),
      None => Ok(None),
    }
  }

  /// Raw copy of the value for `key`, used as a rollback point.
  pub fn snapshot(&self, key: &QueryKey) -> Option<Value> {
    self
      .entries
      .lock()
      .get(key)
      .and_then(|entry| entry.value.clone())
  }

  /// Replace the value for `key`. Does not merge and does not clear staleness.
  pub fn write<T: Serialize>(&self, key: &QueryKey, value: &T) -> Result<(), CacheError> {
    let value = serde_json::to_value(value).map_err(|source| CacheError::Encode {
      key: key.to_string(),
      source,
    })?;
    self.restore(key, Some(value));
    Ok(())
  }

  /// Put a snapshot back exactly as taken. `None` makes the key absent again.
  pub fn restore(&self, key: &QueryKey, snapshot: Option<Value>) {
    {
      let mut entries = self.entries.lock();
      let entry = entries.entry(key.clone()).or_default();
      entry.replace(snapshot);
      debug!(key = %key, generation = entry.generation, "cache write");
    }
    self.emit(CacheEvent::Written(key.clone()));
  }

  /// Mark `key` stale so the next read refetches it. A fetch already in
  /// flight for `key` is discarded when it lands, since it may predate
  /// whatever the invalidation was reporting.
  pub fn invalidate(&self, key: &QueryKey) {
    if let Some(entry) = self.entries.lock().get_mut(key) {
      entry.stale = true;
      entry.generation += 1;
    }
    debug!(key = %key, "cache invalidate");
    self.emit(CacheEvent::Invalidated(key.clone()));
  }

  /// Ask that any fetch currently in flight for `key` be ignored when it lands.
  pub fn cancel_pending(&self, key: &QueryKey) {
    let mut entries = self.entries.lock();
    let entry = entries.entry(key.clone()).or_default();
    entry.generation += 1;
  }

  /// Whether the next read of `key` should go to the network.
  pub fn is_stale(&self, key: &QueryKey) -> bool {
    self
      .status(key)
      .map(|status| status.stale)
      .unwrap_or(true)
  }

  /// Staleness and age of the value for `key`, if one is cached.
  pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
    let entries = self.entries.lock();
    let entry = entries.get(key)?;
    entry.value.as_ref()?;
    Some(EntryStatus {
      stale: entry.stale,
      written_at: entry.written_at?,
    })
  }

  /// Record the start of a fetch for `key`.
  pub fn begin_fetch(&self, key: &QueryKey) -> FetchTicket {
    let mut entries = self.entries.lock();
    let entry = entries.entry(key.clone()).or_default();
    FetchTicket {
      key: key.clone(),
      generation: entry.generation,
    }
  }

  /// Store a fetch result unless the key was written, invalidated or
  /// cancelled since the ticket was issued. Returns whether the result was applied.
  pub fn complete_fetch<T: Serialize>(
    &self,
    ticket: FetchTicket,
    value: &T,
  ) -> Result<bool, CacheError> {
    let value = serde_json::to_value(value).map_err(|source| CacheError::Encode {
      key: ticket.key.to_string(),
      source,
    })?;

    let applied = {
      let mut entries = self.entries.lock();
      let entry = entries.entry(ticket.key.clone()).or_default();
      if entry.generation == ticket.generation {
        entry.replace(Some(value));
        entry.stale = false;
        true
      } else {
        false
      }
    };

    if applied {
      self.emit(CacheEvent::Written(ticket.key));
    } else {
      warn!(key = %ticket.key, "discarding fetch result superseded by a newer write");
      self.emit(CacheEvent::FetchDiscarded(ticket.key));
    }
    Ok(applied)
  }

  /// Keys that currently hold a value.
  pub fn keys(&self) -> Vec<QueryKey> {
    self
      .entries
      .lock()
      .iter()
      .filter(|(_, entry)| entry.value.is_some())
      .map(|(key, _)| key.clone())
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Task, TaskStatus};

  fn task(id: &str) -> Task {
    Task {
      id: id.to_string(),
      title: format!("Task {}", id),
      description: None,
      status: TaskStatus::Todo,
      assignee: None,
      due_date: None,
    }
  }

  #[test]
  fn test_read_absent() {
    let cache = QueryCache::new();
    let tasks: Option<Vec<Task>> = cache.read(&QueryKey::tasks("p1")).unwrap();
    assert!(tasks.is_none());
    assert!(cache.is_stale(&QueryKey::tasks("p1")));
  }

  #[test]
  fn test_write_replaces_without_merging() {
    let cache = QueryCache::new();
    let key = QueryKey::tasks("p1");
    cache.write(&key, &vec![task("t1"), task("t2")]).unwrap();
    cache.write(&key, &vec![task("t3")]).unwrap();

    let tasks: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(tasks, vec![task("t3")]);
    assert_eq!(cache.keys(), vec![key]);
  }

  #[test]
  fn test_reads_are_copies() {
    let cache = QueryCache::new();
    let key = QueryKey::tasks("p1");
    cache.write(&key, &vec![task("t1")]).unwrap();

    let mut tasks: Vec<Task> = cache.read(&key).unwrap().unwrap();
    tasks[0].title = "changed locally".to_string();

    let again: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(again[0].title, "Task t1");
  }

  #[test]
  fn test_restore_absent_snapshot() {
    let cache = QueryCache::new();
    let key = QueryKey::tasks("p1");
    let snapshot = cache.snapshot(&key);
    cache.write(&key, &vec![task("t1")]).unwrap();
    cache.restore(&key, snapshot);

    let tasks: Option<Vec<Task>> = cache.read(&key).unwrap();
    assert!(tasks.is_none());
  }

  #[test]
  fn test_invalidate_marks_stale() {
    let cache = QueryCache::new();
    let key = QueryKey::Projects;
    let ticket = cache.begin_fetch(&key);
    assert!(cache.complete_fetch(ticket, &Vec::<Task>::new()).unwrap());
    assert!(!cache.is_stale(&key));

    cache.invalidate(&key);
    assert!(cache.is_stale(&key));
  }

  #[test]
  fn test_fetch_discarded_after_write() {
    let cache = QueryCache::new();
    let key = QueryKey::tasks("p1");
    cache.write(&key, &vec![task("t1")]).unwrap();

    let ticket = cache.begin_fetch(&key);
    cache.write(&key, &vec![task("t1"), task("optimistic")]).unwrap();

    let applied = cache.complete_fetch(ticket, &vec![task("t1")]).unwrap();
    assert!(!applied);
    let tasks: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(tasks.len(), 2);
  }

  #[test]
  fn test_fetch_discarded_after_cancel() {
    let cache = QueryCache::new();
    let key = QueryKey::tasks("p1");
    let ticket = cache.begin_fetch(&key);
    cache.cancel_pending(&key);

    assert!(!cache.complete_fetch(ticket, &vec![task("t1")]).unwrap());
    let tasks: Option<Vec<Task>> = cache.read(&key).unwrap();
    assert!(tasks.is_none());
  }

  #[test]
  fn test_fetch_discarded_after_invalidate() {
    let cache = QueryCache::new();
    let key = QueryKey::tasks("p1");
    cache.write(&key, &vec![task("t1")]).unwrap();
    cache.invalidate(&key);

    let ticket = cache.begin_fetch(&key);
    cache.write(&key, &vec![task("t1"), task("optimistic")]).unwrap();
    let late = cache.begin_fetch(&key);
    cache.invalidate(&key);

    assert!(!cache.complete_fetch(ticket, &vec![task("t1")]).unwrap());
    assert!(!cache.complete_fetch(late, &vec![task("t1")]).unwrap());
    assert!(cache.is_stale(&key));
    let tasks: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(tasks.len(), 2);

    let fresh = cache.begin_fetch(&key);
    assert!(cache.complete_fetch(fresh, &vec![task("t1")]).unwrap());
    assert!(!cache.is_stale(&key));
  }

  #[test]
  fn test_events() {
    let cache = QueryCache::new();
    let mut events = cache.subscribe();
    let key = QueryKey::tasks("p1");

    cache.write(&key, &vec![task("t1")]).unwrap();
    cache.invalidate(&key);
    let ticket = cache.begin_fetch(&key);
    cache.cancel_pending(&key);
    cache.complete_fetch(ticket, &vec![task("t2")]).unwrap();

    assert_eq!(events.try_recv().unwrap(), CacheEvent::Written(key.clone()));
    assert_eq!(events.try_recv().unwrap(), CacheEvent::Invalidated(key.clone()));
    assert_eq!(events.try_recv().unwrap(), CacheEvent::FetchDiscarded(key));
    assert!(events.try_recv().is_err());
  }

  #[test]
  fn test_decode_error() {
    let cache = QueryCache::new();
    let key = QueryKey::Users;
    cache.write(&key, &"not a list").unwrap();
    let result: Result<Option<Vec<Task>>, _> = cache.read(&key);
    assert!(matches!(result, Err(CacheError::Decode { .. })));
  }
}
