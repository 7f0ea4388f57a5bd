//! Runs mutations through the optimistic update protocol.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Mutation, MutationKind, MutationPhase};
use crate::api::TaskApi;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{CacheError, MutationError};

/// State of one in-flight mutation.
///
/// Created on entering `Applying`; dropping it settles the mutation, so the
/// invalidation happens on every exit path, including a cancelled future.
struct MutationContext<'a> {
  cache: &'a QueryCache,
  in_flight: &'a AtomicUsize,
  kind: MutationKind,
  key: QueryKey,
  dependents: Vec<QueryKey>,
  snapshot: Option<Value>,
  phase: MutationPhase,
}

impl<'a> MutationContext<'a> {
  /// Enter `Applying`: silence in-flight refetches, then take the snapshot.
  fn begin(
    cache: &'a QueryCache,
    in_flight: &'a AtomicUsize,
    kind: MutationKind,
    key: QueryKey,
    dependents: Vec<QueryKey>,
  ) -> Self {
    cache.cancel_pending(&key);
    let snapshot = cache.snapshot(&key);
    in_flight.fetch_add(1, Ordering::SeqCst);
    info!(mutation = %kind, key = %key, "applying");

    Self {
      cache,
      in_flight,
      kind,
      key,
      dependents,
      snapshot,
      phase: MutationPhase::Applying,
    }
  }

  /// The snapshot decoded as the mutation's list type.
  fn prior<T: DeserializeOwned>(&self) -> Result<Option<T>, CacheError> {
    self
      .snapshot
      .clone()
      .map(serde_json::from_value)
      .transpose()
      .map_err(|source| CacheError::Decode {
        key: self.key.to_string(),
        source,
      })
  }

  fn commit(&mut self) {
    debug_assert_eq!(self.phase, MutationPhase::Applying);
    self.phase = MutationPhase::Committed;
    info!(mutation = %self.kind, key = %self.key, "committed");
  }

  /// Put the pre-mutation value back exactly as it was.
  fn roll_back(&mut self) {
    debug_assert_eq!(self.phase, MutationPhase::Applying);
    self.cache.restore(&self.key, self.snapshot.clone());
    self.phase = MutationPhase::RolledBack;
    warn!(mutation = %self.kind, key = %self.key, "rolled back");
  }

  /// Invalidate the key and its dependents. Runs once.
  fn settle(&mut self) {
    match self.phase {
      MutationPhase::Settled => return,
      MutationPhase::Applying => {
        warn!(mutation = %self.kind, key = %self.key, "abandoned before completion");
        self.roll_back();
      }
      MutationPhase::Committed | MutationPhase::RolledBack => {}
    }

    self.cache.invalidate(&self.key);
    for key in &self.dependents {
      self.cache.invalidate(key);
    }
    self.phase = MutationPhase::Settled;
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    info!(mutation = %self.kind, key = %self.key, "settled");
  }
}

impl Drop for MutationContext<'_> {
  fn drop(&mut self) {
    self.settle();
  }
}

/// Sequences cache writes around remote mutations.
///
/// Holds no lock across requests: concurrent mutations on one key interleave,
/// and at each phase boundary the last write to the cache wins.
#[derive(Clone)]
pub struct MutationCoordinator {
  cache: Arc<QueryCache>,
  api: Arc<dyn TaskApi>,
  in_flight: Arc<AtomicUsize>,
}

impl MutationCoordinator {
  pub fn new(cache: Arc<QueryCache>, api: Arc<dyn TaskApi>) -> Self {
    Self {
      cache,
      api,
      in_flight: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Mutations that have started applying and not yet settled.
  pub fn in_flight(&self) -> usize {
    self.in_flight.load(Ordering::SeqCst)
  }

  /// Run one mutation attempt. No retries.
  pub async fn run<M: Mutation>(&self, mutation: &M) -> Result<M::Output, MutationError> {
    if let Err(e) = mutation.validate() {
      warn!(mutation = %mutation.kind(), error = %e, "rejected");
      return Err(e.into());
    }

    let key = mutation.key();
    let mut context = MutationContext::begin(
      &self.cache,
      &self.in_flight,
      mutation.kind(),
      key.clone(),
      mutation.dependent_keys(),
    );

    let prior = context.prior::<Vec<M::Item>>()?;
    if let Some(optimistic) = mutation.optimistic(prior) {
      self.cache.write(&key, &optimistic)?;
    }

    let result = mutation.execute(self.api.as_ref()).await;
    match result {
      Ok(output) => {
        context.commit();
        context.settle();
        Ok(output)
      }
      Err(e) => {
        warn!(mutation = %mutation.kind(), error = %e, "request failed");
        context.roll_back();
        context.settle();
        Err(e.into())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::MockApi;
  use crate::cache::{CacheEvent, CacheSource, QueryClient};
  use crate::error::ApiError;
  use crate::model::{
    Assignee, NewTask, StatusChange, Task, TaskDeletion, TaskStatus, TaskUpdate,
  };
  use crate::mutation::{CreateTask, DeleteTask, UpdateTask, UpdateTaskStatus};
  use std::time::Duration;
  use tokio::sync::broadcast;

  fn task(id: &str, status: TaskStatus) -> Task {
    Task {
      id: id.to_string(),
      title: format!("Task {}", id),
      description: Some("Write the thing".to_string()),
      status,
      assignee: Some(Assignee {
        id: "user-1".to_string(),
        name: "Alice".to_string(),
      }),
      due_date: Some("2025-05-10".to_string()),
    }
  }

  fn setup(api: MockApi) -> (Arc<QueryCache>, Arc<MockApi>, MutationCoordinator) {
    let cache = Arc::new(QueryCache::new());
    let api = Arc::new(api);
    let coordinator = MutationCoordinator::new(cache.clone(), api.clone());
    (cache, api, coordinator)
  }

  fn drain(events: &mut broadcast::Receiver<CacheEvent>) -> Vec<CacheEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
      out.push(event);
    }
    out
  }

  fn status_change(task_id: &str, status: TaskStatus) -> UpdateTaskStatus {
    UpdateTaskStatus(StatusChange {
      project_id: "proj-1".to_string(),
      task_id: task_id.to_string(),
      status,
    })
  }

  #[tokio::test]
  async fn test_status_change_commits_then_invalidates() {
    let (cache, _api, coordinator) = setup(MockApi::new());
    let key = QueryKey::tasks("proj-1");
    cache.write(&key, &vec![task("task-102", TaskStatus::Todo)]).unwrap();
    let mut events = cache.subscribe();

    let updated = coordinator
      .run(&status_change("task-102", TaskStatus::Done))
      .await
      .unwrap();
    assert_eq!(updated.status, TaskStatus::Done);

    let cached: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(cached[0].status, TaskStatus::Done);
    assert_eq!(
      drain(&mut events),
      vec![CacheEvent::Written(key.clone()), CacheEvent::Invalidated(key.clone())]
    );
    assert!(cache.is_stale(&key));
    assert_eq!(coordinator.in_flight(), 0);
  }

  #[tokio::test]
  async fn test_failed_status_change_rolls_back_exactly() {
    let (cache, api, coordinator) = setup(MockApi::new().with_latency(Duration::from_millis(30)));
    let key = QueryKey::tasks("proj-1");
    let before = vec![task("t1", TaskStatus::Todo), task("t2", TaskStatus::InProgress)];
    cache.write(&key, &before).unwrap();
    let snapshot = cache.snapshot(&key);
    let mut events = cache.subscribe();
    api.fail_next(1);

    let run = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.run(&status_change("t1", TaskStatus::Done)).await })
    };

    // Optimistic value is visible while the request is in flight
    tokio::time::sleep(Duration::from_millis(10)).await;
    let during: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(during[0].status, TaskStatus::Done);
    assert_eq!(coordinator.in_flight(), 1);

    let result = run.await.unwrap();
    assert!(matches!(result, Err(MutationError::Api(ApiError::Status { .. }))));

    assert_eq!(cache.snapshot(&key), snapshot);
    let after: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(
      drain(&mut events),
      vec![
        CacheEvent::Written(key.clone()),
        CacheEvent::Written(key.clone()),
        CacheEvent::Invalidated(key.clone()),
      ]
    );
  }

  #[tokio::test]
  async fn test_status_change_only_touches_status() {
    let (cache, _api, coordinator) = setup(MockApi::new().with_latency(Duration::from_millis(20)));
    let key = QueryKey::tasks("proj-1");
    let before = task("task-101", TaskStatus::InProgress);
    cache.write(&key, &vec![before.clone()]).unwrap();

    let run = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.run(&status_change("task-101", TaskStatus::Done)).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let optimistic: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(
      optimistic[0],
      Task {
        status: TaskStatus::Done,
        ..before
      }
    );
    run.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn test_delete_missing_id_is_noop_and_settles() {
    let (cache, _api, coordinator) = setup(MockApi::new());
    let key = QueryKey::tasks("proj-1");
    let before = vec![task("task-101", TaskStatus::Todo)];
    cache.write(&key, &before).unwrap();
    let mut events = cache.subscribe();

    let result = coordinator
      .run(&DeleteTask(TaskDeletion {
        project_id: "proj-1".to_string(),
        task_id: "t9".to_string(),
      }))
      .await;
    // The server does not know t9 either
    assert!(matches!(result, Err(MutationError::Api(ApiError::NotFound(_)))));

    let after: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(after, before);
    let invalidations = drain(&mut events)
      .into_iter()
      .filter(|e| *e == CacheEvent::Invalidated(key.clone()))
      .count();
    assert_eq!(invalidations, 1);
  }

  #[tokio::test]
  async fn test_dependents_invalidated_after_primary() {
    let (cache, _api, coordinator) = setup(MockApi::new());
    let mut events = cache.subscribe();

    coordinator
      .run(&CreateTask::new(NewTask::new("proj-2", "Draft onboarding")))
      .await
      .unwrap();

    let events = drain(&mut events);
    assert_eq!(
      events,
      vec![
        CacheEvent::Written(QueryKey::tasks("proj-2")),
        CacheEvent::Invalidated(QueryKey::tasks("proj-2")),
        CacheEvent::Invalidated(QueryKey::Projects),
      ]
    );
  }

  #[tokio::test]
  async fn test_validation_never_touches_cache_or_api() {
    let (cache, api, coordinator) = setup(MockApi::new());
    let mut events = cache.subscribe();

    let result = coordinator
      .run(&CreateTask::new(NewTask::new("proj-1", "no")))
      .await;
    assert!(matches!(result, Err(MutationError::Validation(_))));
    assert!(drain(&mut events).is_empty());
    assert_eq!(api.call_count(), 0);
    assert_eq!(coordinator.in_flight(), 0);
  }

  #[tokio::test]
  async fn test_update_absent_list_writes_nothing() {
    let (cache, _api, coordinator) = setup(MockApi::new());
    let key = QueryKey::tasks("proj-1");
    let mut events = cache.subscribe();

    let mut update = TaskUpdate::from_task("proj-1", &task("task-101", TaskStatus::Todo));
    update.title = "Renamed task".to_string();
    coordinator.run(&UpdateTask(update)).await.unwrap();

    assert_eq!(drain(&mut events), vec![CacheEvent::Invalidated(key.clone())]);
    let cached: Option<Vec<Task>> = cache.read(&key).unwrap();
    assert!(cached.is_none());
  }

  #[tokio::test]
  async fn test_cancelled_mutation_rolls_back_and_settles() {
    let (cache, _api, coordinator) = setup(MockApi::new().with_latency(Duration::from_millis(200)));
    let key = QueryKey::tasks("proj-1");
    let before = vec![task("task-101", TaskStatus::Todo)];
    cache.write(&key, &before).unwrap();

    let change = status_change("task-101", TaskStatus::Done);
    let result = tokio::time::timeout(Duration::from_millis(20), coordinator.run(&change)).await;
    assert!(result.is_err());

    let after: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(after, before);
    assert!(cache.is_stale(&key));
    assert_eq!(coordinator.in_flight(), 0);
  }

  #[tokio::test]
  async fn test_late_rollback_overwrites_later_optimistic_write() {
    // Rolling back the first mutation restores its snapshot, which predates
    // the second mutation's optimistic write. Last write wins.
    let (cache, api, coordinator) = setup(MockApi::new().with_latency(Duration::from_millis(30)));
    let key = QueryKey::tasks("proj-1");
    cache
      .write(&key, &vec![task("task-101", TaskStatus::Todo), task("task-102", TaskStatus::Todo)])
      .unwrap();
    api.fail_next(1);

    let first = status_change("task-101", TaskStatus::Done);
    let second = status_change("task-102", TaskStatus::Done);
    let (first, second) = tokio::join!(coordinator.run(&first), async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      coordinator.run(&second).await
    });
    assert!(first.is_err());
    assert!(second.is_ok());

    let cached: Vec<Task> = cache.read(&key).unwrap().unwrap();
    assert_eq!(cached[0].status, TaskStatus::Todo);
    assert_eq!(cached[1].status, TaskStatus::Todo);
    assert!(cache.is_stale(&key));
  }

  #[tokio::test]
  async fn test_fetch_landing_after_settle_keeps_key_stale() {
    let (cache, api, coordinator) = setup(MockApi::new().with_latency(Duration::from_millis(30)));
    let queries = QueryClient::new(cache.clone());
    let key = QueryKey::tasks("proj-1");
    let before = api.stored_tasks("proj-1");
    cache.write(&key, &before).unwrap();
    cache.invalidate(&key);

    let run = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.run(&status_change("task-102", TaskStatus::Done)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // A read that starts while the mutation is applying and answers late,
    // with the list as it was before the change
    let (tx, rx) = tokio::sync::oneshot::channel::<Vec<Task>>();
    let fetch = {
      let queries = queries.clone();
      let key = key.clone();
      tokio::spawn(async move {
        queries
          .fetch(&key, || async move { Ok::<_, ApiError>(rx.await.unwrap_or_default()) })
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    run.await.unwrap().unwrap();
    assert!(cache.is_stale(&key));
    tx.send(before).unwrap();
    fetch.await.unwrap().unwrap();

    assert!(cache.is_stale(&key));
    let next = queries
      .fetch(&key, || {
        let api = api.clone();
        async move { api.list_tasks("proj-1").await }
      })
      .await
      .unwrap();
    assert_eq!(next.source, CacheSource::Network);
    let task = next.data.iter().find(|t| t.id == "task-102").unwrap();
    assert_eq!(task.status, TaskStatus::Done);
  }
}
