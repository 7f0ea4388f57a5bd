//! Remote store access.
//!
//! [`TaskApi`] is the request/response contract the rest of the crate relies
//! on. [`HttpApi`] talks to the real REST service, [`MockApi`] serves the same
//! contract from memory.

pub mod cached_client;
pub mod client;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::{
  MembershipChange, NewProject, NewTask, Project, ProjectDeletion, ProjectUpdate, StatusChange,
  Task, TaskDeletion, TaskUpdate, User,
};

pub use cached_client::CachedBoardClient;
pub use client::HttpApi;
pub use mock::MockApi;

/// The board's REST API. Every call is a single attempt; callers retry.
#[async_trait]
pub trait TaskApi: Send + Sync {
  async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError>;

  async fn get_task(&self, task_id: &str) -> Result<Task, ApiError>;

  async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError>;

  async fn update_task(&self, update: &TaskUpdate) -> Result<Task, ApiError>;

  async fn update_task_status(&self, change: &StatusChange) -> Result<Task, ApiError>;

  async fn delete_task(&self, deletion: &TaskDeletion) -> Result<(), ApiError>;

  async fn list_projects(&self) -> Result<Vec<Project>, ApiError>;

  async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError>;

  async fn update_project(&self, update: &ProjectUpdate) -> Result<Project, ApiError>;

  async fn delete_project(&self, deletion: &ProjectDeletion) -> Result<(), ApiError>;

  /// Users that may be assigned tasks in the project.
  async fn list_project_members(&self, project_id: &str) -> Result<Vec<User>, ApiError>;

  async fn add_project_member(&self, change: &MembershipChange) -> Result<(), ApiError>;

  async fn remove_project_member(&self, change: &MembershipChange) -> Result<(), ApiError>;

  async fn list_users(&self) -> Result<Vec<User>, ApiError>;
}
