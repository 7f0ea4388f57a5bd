//! Domain types shared by the API client, the cache and the mutations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cache::Cacheable;
use crate::error::ValidationError;

const TITLE_MIN: usize = 3;
const TITLE_MAX: usize = 100;
const DESCRIPTION_MIN: usize = 5;
const DESCRIPTION_MAX: usize = 500;
const PROJECT_NAME_MAX: usize = 100;

/// Workflow column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
  Todo,
  InProgress,
  Done,
}

impl TaskStatus {
  pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

  pub fn as_str(&self) -> &'static str {
    match self {
      TaskStatus::Todo => "TODO",
      TaskStatus::InProgress => "IN_PROGRESS",
      TaskStatus::Done => "DONE",
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = ValidationError;

  /// Accepts the wire names as well as the short forms used on the command line
  /// (`todo`, `doing`, `progress`, `done`).
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
      "todo" | "to_do" => Ok(TaskStatus::Todo),
      "in_progress" | "progress" | "doing" | "wip" => Ok(TaskStatus::InProgress),
      "done" => Ok(TaskStatus::Done),
      _ => Err(ValidationError::UnknownStatus(s.to_string())),
    }
  }
}

/// Reference to the user a task is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
  pub id: String,
  #[serde(default)]
  pub name: String,
}

/// A task as the server returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub status: TaskStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignee: Option<Assignee>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
}

/// Project summary with its member ids and derived task count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(default)]
  pub task_count: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub name: String,
}

impl Cacheable for Task {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "task"
  }
}

impl Cacheable for Project {
  fn cache_key(&self) -> &str {
    &self.id
  }

  fn entity_type() -> &'static str {
    "project"
  }
}

/// Narrows a task list by title text, status and assignee. Empty matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
  pub text: Option<String>,
  pub status: Option<TaskStatus>,
  /// Assignee id or name; `none` matches unassigned tasks
  pub assignee: Option<String>,
}

impl TaskFilter {
  pub fn matches(&self, task: &Task) -> bool {
    if let Some(text) = &self.text {
      if !task.title.to_lowercase().contains(&text.to_lowercase()) {
        return false;
      }
    }
    if let Some(status) = self.status {
      if task.status != status {
        return false;
      }
    }
    match (self.assignee.as_deref(), &task.assignee) {
      (None, _) => true,
      (Some(wanted), None) => wanted.eq_ignore_ascii_case("none"),
      (Some(wanted), Some(assignee)) => {
        assignee.id == wanted || assignee.name.eq_ignore_ascii_case(wanted)
      }
    }
  }

  pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
    tasks.iter().filter(|task| self.matches(task)).collect()
  }
}

// ============================================================================
// Mutation payloads
// ============================================================================

/// Payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
  pub project_id: String,
  pub title: String,
  pub description: Option<String>,
  pub status: TaskStatus,
  pub assignee: Option<Assignee>,
  pub due_date: Option<String>,
}

impl NewTask {
  pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      project_id: project_id.into(),
      title: title.into(),
      description: None,
      status: TaskStatus::Todo,
      assignee: None,
      due_date: None,
    }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)?;
    validate_task_fields(&self.title, self.description.as_deref(), self.due_date.as_deref())
  }
}

/// Full replacement of a task's mutable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
  pub project_id: String,
  pub task_id: String,
  pub title: String,
  pub description: Option<String>,
  pub status: TaskStatus,
  pub assignee: Option<Assignee>,
  pub due_date: Option<String>,
}

impl TaskUpdate {
  /// Start an update from the current state of `task`.
  pub fn from_task(project_id: impl Into<String>, task: &Task) -> Self {
    Self {
      project_id: project_id.into(),
      task_id: task.id.clone(),
      title: task.title.clone(),
      description: task.description.clone(),
      status: task.status,
      assignee: task.assignee.clone(),
      due_date: task.due_date.clone(),
    }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)?;
    require_id("taskId", &self.task_id)?;
    validate_task_fields(&self.title, self.description.as_deref(), self.due_date.as_deref())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
  pub project_id: String,
  pub task_id: String,
  pub status: TaskStatus,
}

impl StatusChange {
  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)?;
    require_id("taskId", &self.task_id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDeletion {
  pub project_id: String,
  pub task_id: String,
}

impl TaskDeletion {
  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)?;
    require_id("taskId", &self.task_id)
  }
}

/// Adds or removes `user_id` from a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
  pub project_id: String,
  pub user_id: String,
}

impl MembershipChange {
  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)?;
    require_id("userId", &self.user_id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
  pub name: String,
  pub description: String,
}

impl NewProject {
  pub fn validate(&self) -> Result<(), ValidationError> {
    validate_project_name(&self.name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectUpdate {
  pub project_id: String,
  pub name: String,
  pub description: String,
}

impl ProjectUpdate {
  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)?;
    validate_project_name(&self.name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDeletion {
  pub project_id: String,
}

impl ProjectDeletion {
  pub fn validate(&self) -> Result<(), ValidationError> {
    require_id("projectId", &self.project_id)
  }
}

// ============================================================================
// Validation helpers
// ============================================================================

fn require_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
  if value.trim().is_empty() {
    return Err(ValidationError::MissingField(field));
  }
  Ok(())
}

fn validate_task_fields(
  title: &str,
  description: Option<&str>,
  due_date: Option<&str>,
) -> Result<(), ValidationError> {
  check_length("title", title, TITLE_MIN, TITLE_MAX)?;
  if let Some(description) = description {
    check_length("description", description, DESCRIPTION_MIN, DESCRIPTION_MAX)?;
  }
  if let Some(due) = due_date {
    NaiveDate::parse_from_str(due, "%Y-%m-%d")
      .map_err(|_| ValidationError::InvalidDueDate(due.to_string()))?;
  }
  Ok(())
}

fn validate_project_name(name: &str) -> Result<(), ValidationError> {
  check_length("name", name, 1, PROJECT_NAME_MAX)
}

fn check_length(
  field: &'static str,
  value: &str,
  min: usize,
  max: usize,
) -> Result<(), ValidationError> {
  let len = value.trim().chars().count();
  if len < min {
    return Err(ValidationError::TooShort { field, min });
  }
  if len > max {
    return Err(ValidationError::TooLong { field, max });
  }
  Ok(())
}
