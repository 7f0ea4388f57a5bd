//! Optimistic mutations over the query cache.
//!
//! Every mutation runs `Idle -> Applying -> {Committed | RolledBack} -> Settled`:
//! the cache is changed before the request resolves, restored from a snapshot
//! if the request fails, and invalidated (along with any dependent keys) once
//! the outcome is known, whatever it was.

mod coordinator;
mod kinds;
pub mod transform;

use async_trait::async_trait;
use std::fmt;

use crate::api::TaskApi;
use crate::cache::{Cacheable, QueryKey};
use crate::error::{ApiError, ValidationError};

pub use coordinator::MutationCoordinator;
pub use kinds::{
  AddProjectMember, CreateProject, CreateTask, DeleteProject, DeleteTask, RemoveProjectMember,
  UpdateProject, UpdateTask, UpdateTaskStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  CreateTask,
  UpdateTask,
  UpdateTaskStatus,
  DeleteTask,
  AddMember,
  RemoveMember,
  CreateProject,
  UpdateProject,
  DeleteProject,
}

impl fmt::Display for MutationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      MutationKind::CreateTask => "create task",
      MutationKind::UpdateTask => "update task",
      MutationKind::UpdateTaskStatus => "update task status",
      MutationKind::DeleteTask => "delete task",
      MutationKind::AddMember => "add project member",
      MutationKind::RemoveMember => "remove project member",
      MutationKind::CreateProject => "create project",
      MutationKind::UpdateProject => "update project",
      MutationKind::DeleteProject => "delete project",
    };
    f.write_str(name)
  }
}

/// Where a single mutation invocation is in its lifecycle once it has left
/// `Idle`. A mutation that fails validation never gets a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
  Applying,
  Committed,
  RolledBack,
  Settled,
}

/// A change to server state with an optimistic cache counterpart.
#[async_trait]
pub trait Mutation: Send + Sync {
  /// Element type of the cached list at [`Mutation::key`]
  type Item: Cacheable;
  /// What the request returns on success
  type Output: Send;

  fn kind(&self) -> MutationKind;

  /// The cache entry changed optimistically.
  fn key(&self) -> QueryKey;

  /// Entries derived from the same server state, invalidated at settle time.
  fn dependent_keys(&self) -> Vec<QueryKey> {
    Vec::new()
  }

  /// Checked before anything else; a failure never touches the cache.
  fn validate(&self) -> Result<(), ValidationError>;

  /// Pure transform of the cached list. `None` leaves the entry as it is.
  fn optimistic(&self, prior: Option<Vec<Self::Item>>) -> Option<Vec<Self::Item>>;

  /// The single request this mutation makes.
  async fn execute(&self, api: &dyn TaskApi) -> Result<Self::Output, ApiError>;
}
