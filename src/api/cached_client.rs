//! Board client that reads through the query cache and writes through the
//! mutation coordinator.

use std::sync::Arc;

use crate::cache::{CacheResult, QueryCache, QueryClient, QueryKey};
use crate::config::CacheConfig;
use crate::error::{ApiError, MutationError};
use crate::model::{
  Assignee, MembershipChange, NewProject, NewTask, Project, ProjectDeletion, ProjectUpdate,
  StatusChange, Task, TaskDeletion, TaskStatus, TaskUpdate, User,
};
use crate::mutation::{
  AddProjectMember, CreateProject, CreateTask, DeleteProject, DeleteTask, MutationCoordinator,
  RemoveProjectMember, UpdateProject, UpdateTask, UpdateTaskStatus,
};

use super::TaskApi;

/// Board client with transparent caching and optimistic writes.
///
/// Clones share the same cache, so a mutation started from one clone is
/// visible to reads through every other.
#[derive(Clone)]
pub struct CachedBoardClient {
  api: Arc<dyn TaskApi>,
  queries: QueryClient,
  mutations: MutationCoordinator,
}

impl CachedBoardClient {
  pub fn new(api: Arc<dyn TaskApi>, config: &CacheConfig) -> Self {
    let cache = Arc::new(QueryCache::new());
    let queries = QueryClient::new(cache.clone()).with_stale_time(config.stale_time());
    let mutations = MutationCoordinator::new(cache, api.clone());

    Self {
      api,
      queries,
      mutations,
    }
  }

  pub fn cache(&self) -> &Arc<QueryCache> {
    self.queries.cache()
  }

  /// Mutations that have not settled yet.
  pub fn pending_mutations(&self) -> usize {
    self.mutations.in_flight()
  }

  // ==========================================================================
  // Queries
  // ==========================================================================

  pub async fn tasks(&self, project_id: &str) -> Result<CacheResult<Vec<Task>>, ApiError> {
    self
      .queries
      .fetch(&QueryKey::tasks(project_id), || {
        let api = self.api.clone();
        let project_id = project_id.to_string();
        async move { api.list_tasks(&project_id).await }
      })
      .await
  }

  pub async fn projects(&self) -> Result<CacheResult<Vec<Project>>, ApiError> {
    self
      .queries
      .fetch(&QueryKey::Projects, || {
        let api = self.api.clone();
        async move { api.list_projects().await }
      })
      .await
  }

  pub async fn project_members(&self, project_id: &str) -> Result<CacheResult<Vec<User>>, ApiError> {
    self
      .queries
      .fetch(&QueryKey::project_members(project_id), || {
        let api = self.api.clone();
        let project_id = project_id.to_string();
        async move { api.list_project_members(&project_id).await }
      })
      .await
  }

  pub async fn users(&self) -> Result<CacheResult<Vec<User>>, ApiError> {
    self
      .queries
      .fetch(&QueryKey::Users, || {
        let api = self.api.clone();
        async move { api.list_users().await }
      })
      .await
  }

  /// Load a project's tasks and members together.
  pub async fn open_project(
    &self,
    project_id: &str,
  ) -> Result<(CacheResult<Vec<Task>>, CacheResult<Vec<User>>), ApiError> {
    futures::future::try_join(self.tasks(project_id), self.project_members(project_id)).await
  }

  /// One task straight from the server, for the detail view.
  pub async fn task(&self, task_id: &str) -> Result<Task, ApiError> {
    self.api.get_task(task_id).await
  }

  /// Drop cached data for every key so the next reads go to the network.
  pub fn refresh_all(&self) {
    for key in self.cache().keys() {
      self.queries.invalidate(&key);
    }
  }

  // ==========================================================================
  // Task mutations
  // ==========================================================================

  pub async fn create_task(&self, task: NewTask) -> Result<Task, MutationError> {
    self.mutations.run(&CreateTask::new(task)).await
  }

  pub async fn update_task(&self, update: TaskUpdate) -> Result<Task, MutationError> {
    self.mutations.run(&UpdateTask(update)).await
  }

  pub async fn update_task_status(
    &self,
    project_id: &str,
    task_id: &str,
    status: TaskStatus,
  ) -> Result<Task, MutationError> {
    let change = StatusChange {
      project_id: project_id.to_string(),
      task_id: task_id.to_string(),
      status,
    };
    self.mutations.run(&UpdateTaskStatus(change)).await
  }

  pub async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), MutationError> {
    let deletion = TaskDeletion {
      project_id: project_id.to_string(),
      task_id: task_id.to_string(),
    };
    self.mutations.run(&DeleteTask(deletion)).await
  }

  /// Full update of one task starting from its current state.
  pub async fn edit_task(
    &self,
    project_id: &str,
    task_id: &str,
    edit: impl FnOnce(&mut TaskUpdate),
  ) -> Result<Task, MutationError> {
    let tasks = self.tasks(project_id).await?.data;
    let task = tasks
      .iter()
      .find(|t| t.id == task_id)
      .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))?;

    let mut update = TaskUpdate::from_task(project_id, task);
    edit(&mut update);
    self.update_task(update).await
  }

  /// Assign a task to a project member, resolving the display name from the
  /// member list.
  pub async fn assign_task(
    &self,
    project_id: &str,
    task_id: &str,
    user_id: &str,
  ) -> Result<Task, MutationError> {
    let members = self.project_members(project_id).await?.data;
    let member = members
      .into_iter()
      .find(|u| u.id == user_id || u.name.eq_ignore_ascii_case(user_id))
      .ok_or_else(|| ApiError::NotFound(format!("member {}", user_id)))?;

    self
      .edit_task(project_id, task_id, |update| {
        update.assignee = Some(Assignee {
          id: member.id,
          name: member.name,
        });
      })
      .await
  }

  // ==========================================================================
  // Membership and project mutations
  // ==========================================================================

  pub async fn add_project_member(&self, project_id: &str, user_id: &str) -> Result<(), MutationError> {
    let change = MembershipChange {
      project_id: project_id.to_string(),
      user_id: user_id.to_string(),
    };
    self.mutations.run(&AddProjectMember(change)).await
  }

  pub async fn remove_project_member(
    &self,
    project_id: &str,
    user_id: &str,
  ) -> Result<(), MutationError> {
    let change = MembershipChange {
      project_id: project_id.to_string(),
      user_id: user_id.to_string(),
    };
    self.mutations.run(&RemoveProjectMember(change)).await
  }

  pub async fn create_project(&self, project: NewProject) -> Result<Project, MutationError> {
    self.mutations.run(&CreateProject::new(project)).await
  }

  pub async fn update_project(&self, update: ProjectUpdate) -> Result<Project, MutationError> {
    self.mutations.run(&UpdateProject(update)).await
  }

  pub async fn delete_project(&self, project_id: &str) -> Result<(), MutationError> {
    let deletion = ProjectDeletion {
      project_id: project_id.to_string(),
    };
    self.mutations.run(&DeleteProject(deletion)).await
  }
}
