//! Pure list transforms applied to cached values before a request resolves.
//!
//! A target id that is not in the list leaves the list untouched; the
//! invalidation at settle time reconciles with the server.

use tracing::debug;

use crate::cache::Cacheable;
use crate::model::{Project, Task, TaskStatus, TaskUpdate};

pub fn append<T>(mut list: Vec<T>, item: T) -> Vec<T> {
  list.push(item);
  list
}

/// Apply `edit` to the element whose key is `id`, if any.
pub fn update_by_id<T: Cacheable>(mut list: Vec<T>, id: &str, edit: impl FnOnce(&mut T)) -> Vec<T> {
  match list.iter_mut().find(|item| item.cache_key() == id) {
    Some(item) => edit(item),
    None => debug!(entity = T::entity_type(), id, "update target not cached"),
  }
  list
}

pub fn remove_by_id<T: Cacheable>(mut list: Vec<T>, id: &str) -> Vec<T> {
  let before = list.len();
  list.retain(|item| item.cache_key() != id);
  if list.len() == before {
    debug!(entity = T::entity_type(), id, "delete target not cached");
  }
  list
}

/// Replace every mutable field of the matching task. The id never changes.
pub fn replace_task_fields(tasks: Vec<Task>, update: &TaskUpdate) -> Vec<Task> {
  update_by_id(tasks, &update.task_id, |task| {
    task.title = update.title.clone();
    task.description = update.description.clone();
    task.status = update.status;
    task.assignee = update.assignee.clone();
    task.due_date = update.due_date.clone();
  })
}

/// Change only the status of the matching task.
pub fn set_task_status(tasks: Vec<Task>, task_id: &str, status: TaskStatus) -> Vec<Task> {
  update_by_id(tasks, task_id, |task| task.status = status)
}

pub fn add_member(projects: Vec<Project>, project_id: &str, user_id: &str) -> Vec<Project> {
  update_by_id(projects, project_id, |project| {
    if !project.members.iter().any(|m| m == user_id) {
      project.members.push(user_id.to_string());
    }
  })
}

pub fn remove_member(projects: Vec<Project>, project_id: &str, user_id: &str) -> Vec<Project> {
  update_by_id(projects, project_id, |project| {
    project.members.retain(|m| m != user_id)
  })
}
