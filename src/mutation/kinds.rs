//! The concrete mutations: what each one touches, how it changes the cache
//! optimistically, and which request it makes.

use async_trait::async_trait;
use uuid::Uuid;

use super::transform;
use super::{Mutation, MutationKind};
use crate::api::TaskApi;
use crate::cache::QueryKey;
use crate::error::{ApiError, ValidationError};
use crate::model::{
  MembershipChange, NewProject, NewTask, Project, ProjectDeletion, ProjectUpdate, StatusChange,
  Task, TaskDeletion, TaskUpdate,
};

fn temp_id() -> String {
  format!("temp-{}", Uuid::new_v4())
}

// ============================================================================
// Tasks
// ============================================================================

/// Create a task. The optimistic copy carries a `temp-` id until the
/// settle-time refetch brings in the server's id.
#[derive(Debug, Clone)]
pub struct CreateTask {
  task: NewTask,
  temp_id: String,
}

impl CreateTask {
  pub fn new(task: NewTask) -> Self {
    Self {
      task,
      temp_id: temp_id(),
    }
  }

  pub fn temp_id(&self) -> &str {
    &self.temp_id
  }

  fn synthesized(&self) -> Task {
    Task {
      id: self.temp_id.clone(),
      title: self.task.title.clone(),
      description: self.task.description.clone(),
      status: self.task.status,
      assignee: self.task.assignee.clone(),
      due_date: self.task.due_date.clone(),
    }
  }
}

#[async_trait]
impl Mutation for CreateTask {
  type Item = Task;
  type Output = Task;

  fn kind(&self) -> MutationKind {
    MutationKind::CreateTask
  }

  fn key(&self) -> QueryKey {
    QueryKey::tasks(&self.task.project_id)
  }

  fn dependent_keys(&self) -> Vec<QueryKey> {
    vec![QueryKey::Projects]
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.task.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Task>>) -> Option<Vec<Task>> {
    Some(transform::append(
      prior.unwrap_or_default(),
      self.synthesized(),
    ))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<Task, ApiError> {
    api.create_task(&self.task).await
  }
}

/// Replace all mutable fields of a task.
#[derive(Debug, Clone)]
pub struct UpdateTask(pub TaskUpdate);

#[async_trait]
impl Mutation for UpdateTask {
  type Item = Task;
  type Output = Task;

  fn kind(&self) -> MutationKind {
    MutationKind::UpdateTask
  }

  fn key(&self) -> QueryKey {
    QueryKey::tasks(&self.0.project_id)
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Task>>) -> Option<Vec<Task>> {
    prior.map(|tasks| transform::replace_task_fields(tasks, &self.0))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<Task, ApiError> {
    api.update_task(&self.0).await
  }
}

/// Move a task to another column.
#[derive(Debug, Clone)]
pub struct UpdateTaskStatus(pub StatusChange);

#[async_trait]
impl Mutation for UpdateTaskStatus {
  type Item = Task;
  type Output = Task;

  fn kind(&self) -> MutationKind {
    MutationKind::UpdateTaskStatus
  }

  fn key(&self) -> QueryKey {
    QueryKey::tasks(&self.0.project_id)
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Task>>) -> Option<Vec<Task>> {
    prior.map(|tasks| transform::set_task_status(tasks, &self.0.task_id, self.0.status))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<Task, ApiError> {
    api.update_task_status(&self.0).await
  }
}

#[derive(Debug, Clone)]
pub struct DeleteTask(pub TaskDeletion);

#[async_trait]
impl Mutation for DeleteTask {
  type Item = Task;
  type Output = ();

  fn kind(&self) -> MutationKind {
    MutationKind::DeleteTask
  }

  fn key(&self) -> QueryKey {
    QueryKey::tasks(&self.0.project_id)
  }

  fn dependent_keys(&self) -> Vec<QueryKey> {
    vec![QueryKey::Projects]
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Task>>) -> Option<Vec<Task>> {
    prior.map(|tasks| transform::remove_by_id(tasks, &self.0.task_id))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<(), ApiError> {
    api.delete_task(&self.0).await
  }
}

// ============================================================================
// Membership
// ============================================================================

/// Membership changes also invalidate who can be assigned in the project.
fn membership_dependents(project_id: &str) -> Vec<QueryKey> {
  vec![
    QueryKey::project_members(project_id),
    QueryKey::tasks(project_id),
  ]
}

#[derive(Debug, Clone)]
pub struct AddProjectMember(pub MembershipChange);

#[async_trait]
impl Mutation for AddProjectMember {
  type Item = Project;
  type Output = ();

  fn kind(&self) -> MutationKind {
    MutationKind::AddMember
  }

  fn key(&self) -> QueryKey {
    QueryKey::Projects
  }

  fn dependent_keys(&self) -> Vec<QueryKey> {
    membership_dependents(&self.0.project_id)
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Project>>) -> Option<Vec<Project>> {
    prior.map(|projects| transform::add_member(projects, &self.0.project_id, &self.0.user_id))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<(), ApiError> {
    api.add_project_member(&self.0).await
  }
}

#[derive(Debug, Clone)]
pub struct RemoveProjectMember(pub MembershipChange);

#[async_trait]
impl Mutation for RemoveProjectMember {
  type Item = Project;
  type Output = ();

  fn kind(&self) -> MutationKind {
    MutationKind::RemoveMember
  }

  fn key(&self) -> QueryKey {
    QueryKey::Projects
  }

  fn dependent_keys(&self) -> Vec<QueryKey> {
    membership_dependents(&self.0.project_id)
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Project>>) -> Option<Vec<Project>> {
    prior.map(|projects| transform::remove_member(projects, &self.0.project_id, &self.0.user_id))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<(), ApiError> {
    api.remove_project_member(&self.0).await
  }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateProject {
  project: NewProject,
  temp_id: String,
}

impl CreateProject {
  pub fn new(project: NewProject) -> Self {
    Self {
      project,
      temp_id: temp_id(),
    }
  }
}

#[async_trait]
impl Mutation for CreateProject {
  type Item = Project;
  type Output = Project;

  fn kind(&self) -> MutationKind {
    MutationKind::CreateProject
  }

  fn key(&self) -> QueryKey {
    QueryKey::Projects
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.project.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Project>>) -> Option<Vec<Project>> {
    let project = Project {
      id: self.temp_id.clone(),
      name: self.project.name.clone(),
      description: self.project.description.clone(),
      members: Vec::new(),
      task_count: 0,
      created_at: None,
    };
    Some(transform::append(prior.unwrap_or_default(), project))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<Project, ApiError> {
    api.create_project(&self.project).await
  }
}

#[derive(Debug, Clone)]
pub struct UpdateProject(pub ProjectUpdate);

#[async_trait]
impl Mutation for UpdateProject {
  type Item = Project;
  type Output = Project;

  fn kind(&self) -> MutationKind {
    MutationKind::UpdateProject
  }

  fn key(&self) -> QueryKey {
    QueryKey::Projects
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Project>>) -> Option<Vec<Project>> {
    prior.map(|projects| {
      transform::update_by_id(projects, &self.0.project_id, |project| {
        project.name = self.0.name.clone();
        project.description = self.0.description.clone();
      })
    })
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<Project, ApiError> {
    api.update_project(&self.0).await
  }
}

#[derive(Debug, Clone)]
pub struct DeleteProject(pub ProjectDeletion);

#[async_trait]
impl Mutation for DeleteProject {
  type Item = Project;
  type Output = ();

  fn kind(&self) -> MutationKind {
    MutationKind::DeleteProject
  }

  fn key(&self) -> QueryKey {
    QueryKey::Projects
  }

  fn dependent_keys(&self) -> Vec<QueryKey> {
    vec![
      QueryKey::tasks(&self.0.project_id),
      QueryKey::project_members(&self.0.project_id),
    ]
  }

  fn validate(&self) -> Result<(), ValidationError> {
    self.0.validate()
  }

  fn optimistic(&self, prior: Option<Vec<Project>>) -> Option<Vec<Project>> {
    prior.map(|projects| transform::remove_by_id(projects, &self.0.project_id))
  }

  async fn execute(&self, api: &dyn TaskApi) -> Result<(), ApiError> {
    api.delete_project(&self.0).await
  }
}
