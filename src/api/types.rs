//! Serde types matching the board API's request and response bodies.
//!
//! These types are separate from domain types so the wire format (envelopes,
//! camelCase ids, empty strings) stays out of the rest of the crate.

use serde::{Deserialize, Serialize};

use crate::model::{NewProject, NewTask, ProjectUpdate, TaskStatus, TaskUpdate, User};

// ============================================================================
// Response envelopes
// ============================================================================

/// A successful body is either the payload itself or `{ "data": payload, ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiBody<T> {
  Bare(T),
  Wrapped(ApiEnvelope<T>),
}

impl<T> ApiBody<T> {
  pub fn into_inner(self) -> T {
    match self {
      ApiBody::Bare(data) => data,
      ApiBody::Wrapped(envelope) => envelope.data,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  pub data: T,
  #[serde(default)]
  pub message: Option<String>,
}

/// Body of a non-2xx response.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

impl ApiErrorBody {
  pub fn into_message(self) -> Option<String> {
    self
      .message
      .filter(|m| !m.is_empty())
      .or(self.error.filter(|e| !e.is_empty()))
  }
}

/// `/users` answers with `{ "users": [...] }`, other list endpoints with a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiUserList {
  Bare(Vec<User>),
  Named { users: Vec<User> },
}

impl From<ApiUserList> for Vec<User> {
  fn from(list: ApiUserList) -> Self {
    match list {
      ApiUserList::Bare(users) | ApiUserList::Named { users } => users,
    }
  }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiTaskPayload<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<&'a str>,
  pub title: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<&'a str>,
  pub status: TaskStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assignee_id: Option<&'a str>,
  pub project_id: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<&'a str>,
}

impl<'a> From<&'a NewTask> for ApiTaskPayload<'a> {
  fn from(task: &'a NewTask) -> Self {
    ApiTaskPayload {
      id: None,
      title: &task.title,
      description: task.description.as_deref(),
      status: task.status,
      assignee_id: task.assignee.as_ref().map(|a| a.id.as_str()),
      project_id: &task.project_id,
      due_date: task.due_date.as_deref(),
    }
  }
}

impl<'a> From<&'a TaskUpdate> for ApiTaskPayload<'a> {
  fn from(update: &'a TaskUpdate) -> Self {
    ApiTaskPayload {
      id: Some(&update.task_id),
      title: &update.title,
      description: update.description.as_deref(),
      status: update.status,
      assignee_id: update.assignee.as_ref().map(|a| a.id.as_str()),
      project_id: &update.project_id,
      due_date: update.due_date.as_deref(),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ApiProjectPayload<'a> {
  pub name: &'a str,
  pub description: &'a str,
}

impl<'a> From<&'a NewProject> for ApiProjectPayload<'a> {
  fn from(project: &'a NewProject) -> Self {
    ApiProjectPayload {
      name: &project.name,
      description: &project.description,
    }
  }
}

impl<'a> From<&'a ProjectUpdate> for ApiProjectPayload<'a> {
  fn from(update: &'a ProjectUpdate) -> Self {
    ApiProjectPayload {
      name: &update.name,
      description: &update.description,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMemberPayload<'a> {
  pub user_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ApiLoginPayload<'a> {
  pub email: &'a str,
  pub password: &'a str,
}
