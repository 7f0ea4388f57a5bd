//! In-memory board backend with simulated latency and failure injection.
//!
//! Used when `api.backend: mock` is configured and as the remote store in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::api::TaskApi;
use crate::error::ApiError;
use crate::model::{
  Assignee, MembershipChange, NewProject, NewTask, Project, ProjectDeletion, ProjectUpdate,
  StatusChange, Task, TaskDeletion, TaskStatus, TaskUpdate, User,
};

#[derive(Debug, Default, Clone)]
struct MockState {
  projects: Vec<Project>,
  users: Vec<User>,
  members: HashMap<String, Vec<String>>,
  tasks: HashMap<String, Vec<Task>>,
}

impl MockState {
  fn seeded() -> Self {
    let user = |id: &str, name: &str| User {
      id: id.to_string(),
      name: name.to_string(),
    };
    let project = |id: &str, name: &str, created_at: &str| Project {
      id: id.to_string(),
      name: name.to_string(),
      description: String::new(),
      members: Vec::new(),
      task_count: 0,
      created_at: Some(created_at.to_string()),
    };

    let tasks = vec![
      Task {
        id: "task-101".to_string(),
        title: "Setup state store".to_string(),
        description: Some("Implement global state for modal and current project".to_string()),
        status: TaskStatus::InProgress,
        assignee: Some(Assignee {
          id: "user-1".to_string(),
          name: "Alice".to_string(),
        }),
        due_date: Some("2025-05-10".to_string()),
      },
      Task {
        id: "task-102".to_string(),
        title: "Build Table View".to_string(),
        description: Some("Render the task list with sorting".to_string()),
        status: TaskStatus::Todo,
        assignee: Some(Assignee {
          id: "user-2".to_string(),
          name: "Bob".to_string(),
        }),
        due_date: Some("2025-05-11".to_string()),
      },
    ];

    MockState {
      projects: vec![
        project("proj-1", "Frontend Refactor", "2025-04-01T10:00:00Z"),
        project("proj-2", "Mobile MVP", "2025-04-10T12:00:00Z"),
      ],
      users: vec![
        user("user-1", "Alice"),
        user("user-2", "Bob"),
        user("user-3", "Charlie"),
      ],
      members: HashMap::from([
        (
          "proj-1".to_string(),
          vec!["user-1".to_string(), "user-2".to_string()],
        ),
        ("proj-2".to_string(), vec!["user-3".to_string()]),
      ]),
      tasks: HashMap::from([
        ("proj-1".to_string(), tasks),
        ("proj-2".to_string(), Vec::new()),
      ]),
    }
  }

  /// Fill in the display name the way the server would.
  fn resolve_assignee(&self, assignee: Option<&Assignee>) -> Option<Assignee> {
    let assignee = assignee?;
    let name = self
      .users
      .iter()
      .find(|u| u.id == assignee.id)
      .map(|u| u.name.clone())
      .unwrap_or_else(|| assignee.name.clone());
    Some(Assignee {
      id: assignee.id.clone(),
      name,
    })
  }

  fn task_mut(&mut self, project_id: &str, task_id: &str) -> Result<&mut Task, ApiError> {
    self
      .tasks
      .get_mut(project_id)
      .and_then(|tasks| tasks.iter_mut().find(|t| t.id == task_id))
      .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))
  }

  fn require_project(&self, project_id: &str) -> Result<(), ApiError> {
    if self.projects.iter().any(|p| p.id == project_id) {
      Ok(())
    } else {
      Err(ApiError::NotFound(format!("project {}", project_id)))
    }
  }
}

/// Board API served from memory.
pub struct MockApi {
  state: Mutex<MockState>,
  latency: Duration,
  fail_next: AtomicU32,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl Default for MockApi {
  fn default() -> Self {
    Self::new()
  }
}

impl MockApi {
  /// Backend seeded with the demo projects, users and tasks.
  pub fn new() -> Self {
    Self::with_state(MockState::seeded())
  }

  fn with_state(state: MockState) -> Self {
    Self {
      state: Mutex::new(state),
      latency: Duration::ZERO,
      fail_next: AtomicU32::new(0),
      offline: AtomicBool::new(false),
      calls: AtomicUsize::new(0),
    }
  }

  /// Delay every call by `latency`.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// Make the next `count` calls fail with a 503.
  pub fn fail_next(&self, count: u32) {
    self.fail_next.store(count, Ordering::SeqCst);
  }

  /// Fail every call until switched back.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of calls received so far, failed ones included.
  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Server-side view of a project's tasks.
  pub fn stored_tasks(&self, project_id: &str) -> Vec<Task> {
    self
      .state
      .lock()
      .tasks
      .get(project_id)
      .cloned()
      .unwrap_or_default()
  }

  /// Simulated round trip: latency first, then injected failures.
  async fn round_trip(&self) -> Result<(), ApiError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }

    let injected = self
      .fail_next
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected || self.offline.load(Ordering::SeqCst) {
      return Err(ApiError::from_status(
        StatusCode::SERVICE_UNAVAILABLE,
        Some("Service unavailable (simulated)".to_string()),
      ));
    }
    Ok(())
  }
}

fn short_id(prefix: &str) -> String {
  let id = Uuid::new_v4().simple().to_string();
  format!("{}-{}", prefix, &id[..8])
}

#[async_trait]
impl TaskApi for MockApi {
  async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError> {
    self.round_trip().await?;
    Ok(self.stored_tasks(project_id))
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
    self.round_trip().await?;
    self
      .state
      .lock()
      .tasks
      .values()
      .flatten()
      .find(|t| t.id == task_id)
      .cloned()
      .ok_or_else(|| ApiError::NotFound(format!("task {}", task_id)))
  }

  async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    state.require_project(&task.project_id)?;

    let created = Task {
      id: short_id("task"),
      title: task.title.clone(),
      description: task.description.clone(),
      status: task.status,
      assignee: state.resolve_assignee(task.assignee.as_ref()),
      due_date: task.due_date.clone(),
    };
    state
      .tasks
      .entry(task.project_id.clone())
      .or_default()
      .push(created.clone());
    Ok(created)
  }

  async fn update_task(&self, update: &TaskUpdate) -> Result<Task, ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    let assignee = state.resolve_assignee(update.assignee.as_ref());
    let task = state.task_mut(&update.project_id, &update.task_id)?;

    task.title = update.title.clone();
    task.description = update.description.clone();
    task.status = update.status;
    task.assignee = assignee;
    task.due_date = update.due_date.clone();
    Ok(task.clone())
  }

  async fn update_task_status(&self, change: &StatusChange) -> Result<Task, ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    let task = state.task_mut(&change.project_id, &change.task_id)?;
    task.status = change.status;
    Ok(task.clone())
  }

  async fn delete_task(&self, deletion: &TaskDeletion) -> Result<(), ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    let tasks = state
      .tasks
      .get_mut(&deletion.project_id)
      .ok_or_else(|| ApiError::NotFound(format!("project {}", deletion.project_id)))?;

    let before = tasks.len();
    tasks.retain(|t| t.id != deletion.task_id);
    if tasks.len() == before {
      return Err(ApiError::NotFound(format!("task {}", deletion.task_id)));
    }
    Ok(())
  }

  async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
    self.round_trip().await?;
    let state = self.state.lock();
    Ok(
      state
        .projects
        .iter()
        .map(|p| Project {
          members: state.members.get(&p.id).cloned().unwrap_or_default(),
          task_count: state.tasks.get(&p.id).map_or(0, |t| t.len() as u32),
          ..p.clone()
        })
        .collect(),
    )
  }

  async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
    self.round_trip().await?;
    let created = Project {
      id: short_id("proj"),
      name: project.name.clone(),
      description: project.description.clone(),
      members: Vec::new(),
      task_count: 0,
      created_at: Some(chrono::Utc::now().to_rfc3339()),
    };
    let mut state = self.state.lock();
    state.tasks.insert(created.id.clone(), Vec::new());
    state.projects.push(created.clone());
    Ok(created)
  }

  async fn update_project(&self, update: &ProjectUpdate) -> Result<Project, ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    let project = state
      .projects
      .iter_mut()
      .find(|p| p.id == update.project_id)
      .ok_or_else(|| ApiError::NotFound(format!("project {}", update.project_id)))?;
    project.name = update.name.clone();
    project.description = update.description.clone();
    Ok(project.clone())
  }

  async fn delete_project(&self, deletion: &ProjectDeletion) -> Result<(), ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    state.require_project(&deletion.project_id)?;
    state.projects.retain(|p| p.id != deletion.project_id);
    state.tasks.remove(&deletion.project_id);
    state.members.remove(&deletion.project_id);
    Ok(())
  }

  async fn list_project_members(&self, project_id: &str) -> Result<Vec<User>, ApiError> {
    self.round_trip().await?;
    let state = self.state.lock();
    let ids = state.members.get(project_id).cloned().unwrap_or_default();
    Ok(
      state
        .users
        .iter()
        .filter(|u| ids.contains(&u.id))
        .cloned()
        .collect(),
    )
  }

  async fn add_project_member(&self, change: &MembershipChange) -> Result<(), ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    state.require_project(&change.project_id)?;
    if !state.users.iter().any(|u| u.id == change.user_id) {
      return Err(ApiError::NotFound(format!("user {}", change.user_id)));
    }

    let members = state.members.entry(change.project_id.clone()).or_default();
    if members.contains(&change.user_id) {
      return Err(ApiError::from_status(
        StatusCode::CONFLICT,
        Some(format!("{} is already a member", change.user_id)),
      ));
    }
    members.push(change.user_id.clone());
    Ok(())
  }

  async fn remove_project_member(&self, change: &MembershipChange) -> Result<(), ApiError> {
    self.round_trip().await?;
    let mut state = self.state.lock();
    let members = state
      .members
      .get_mut(&change.project_id)
      .ok_or_else(|| ApiError::NotFound(format!("project {}", change.project_id)))?;

    let before = members.len();
    members.retain(|id| id != &change.user_id);
    if members.len() == before {
      return Err(ApiError::NotFound(format!("member {}", change.user_id)));
    }
    Ok(())
  }

  async fn list_users(&self) -> Result<Vec<User>, ApiError> {
    self.round_trip().await?;
    Ok(self.state.lock().users.clone())
  }
}
