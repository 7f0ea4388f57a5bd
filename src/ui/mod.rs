//! Plain-text rendering for the interactive shell.

pub mod utils;

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::cache::CacheSource;
use crate::commands::COMMANDS;
use crate::model::{Project, Task, TaskStatus, User};
use crate::notifications::{relative_time, NotificationCenter};
use utils::{is_pending_id, status_label, status_marker, truncate};

const TITLE_WIDTH: usize = 40;

/// Note appended to a heading when data did not come straight from the server
pub fn source_note(source: CacheSource) -> Option<&'static str> {
  match source {
    CacheSource::Network | CacheSource::CacheFresh => None,
    CacheSource::CacheStale => Some("(includes unsaved changes)"),
    CacheSource::Offline => Some("(offline, showing cached data)"),
  }
}

fn heading(title: &str, source: CacheSource) -> String {
  match source_note(source) {
    Some(note) => format!("{} {}", title, note),
    None => title.to_string(),
  }
}

/// Tasks grouped into status columns.
pub fn render_board(project: &str, tasks: &[Task], source: CacheSource) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", heading(&format!("Tasks [{}]", project), source));

  for status in TaskStatus::ALL {
    let column: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
    let _ = writeln!(out, "\n{} ({})", status_label(status), column.len());
    for task in column {
      write_task_line(&mut out, task);
    }
  }
  out
}

fn write_task_line(out: &mut String, task: &Task) {
  let _ = write!(
    out,
    "  {} {:<14} {:<width$}",
    status_marker(task.status),
    id_label(&task.id),
    truncate(&task.title, TITLE_WIDTH),
    width = TITLE_WIDTH
  );
  if let Some(assignee) = &task.assignee {
    let _ = write!(out, "  @{}", assignee.name);
  }
  if let Some(due) = &task.due_date {
    let _ = write!(out, "  due {}", due);
  }
  out.push('\n');
}

/// Tasks that passed a filter, in list order.
pub fn render_matches(matches: &[&Task], total: usize, source: CacheSource) -> String {
  let mut out = String::new();
  let _ = writeln!(
    out,
    "{}",
    heading(&format!("{} of {} tasks", matches.len(), total), source)
  );
  if matches.is_empty() {
    out.push_str("  (no matches)\n");
  }
  for task in matches {
    write_task_line(&mut out, task);
  }
  out
}

/// Every field of one task.
pub fn render_task(task: &Task) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}  {}", id_label(&task.id), task.title);
  let _ = writeln!(out, "  Status:      {}", status_label(task.status));
  let assignee = task
    .assignee
    .as_ref()
    .map(|a| format!("{} ({})", a.name, a.id))
    .unwrap_or_else(|| "Unassigned".to_string());
  let _ = writeln!(out, "  Assignee:    {}", assignee);
  let _ = writeln!(
    out,
    "  Due:         {}",
    task.due_date.as_deref().unwrap_or("No due date")
  );
  let _ = writeln!(
    out,
    "  Description: {}",
    task.description.as_deref().unwrap_or("No description provided.")
  );
  out
}

fn id_label(id: &str) -> &str {
  if is_pending_id(id) {
    "(saving)"
  } else {
    id
  }
}

pub fn render_projects(projects: &[Project], current: Option<&str>, source: CacheSource) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", heading("Projects", source));
  if projects.is_empty() {
    out.push_str("  (none)\n");
  }
  for project in projects {
    let marker = if Some(project.id.as_str()) == current { "*" } else { " " };
    let _ = writeln!(
      out,
      "{} {:<14} {:<30} {:>3} tasks  {:>2} members",
      marker,
      id_label(&project.id),
      truncate(&project.name, 30),
      project.task_count,
      project.members.len()
    );
  }
  out
}

pub fn render_users(title: &str, users: &[User], source: CacheSource) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", heading(title, source));
  if users.is_empty() {
    out.push_str("  (none)\n");
  }
  for user in users {
    let _ = writeln!(out, "  {:<10} {}", user.id, user.name);
  }
  out
}

pub fn render_notifications(center: &NotificationCenter, now: DateTime<Utc>) -> String {
  let mut out = String::new();
  let _ = writeln!(
    out,
    "Notifications ({}, {} unread)",
    center.len(),
    center.unread_count()
  );
  if center.is_empty() {
    out.push_str("  (none)\n");
  }
  for n in center.iter() {
    let marker = if n.read { " " } else { "•" };
    let _ = write!(
      out,
      "{} {} [{}] {} ({})",
      marker,
      n.id,
      n.kind,
      n.message,
      relative_time(n.timestamp, now)
    );
    if let Some(description) = &n.description {
      let _ = write!(out, "\n      {}", description);
    }
    out.push('\n');
  }
  out
}

pub fn render_help() -> String {
  let mut out = String::from("Commands\n");
  for cmd in COMMANDS {
    let aliases = if cmd.aliases.is_empty() {
      String::new()
    } else {
      format!(" ({})", cmd.aliases.join(", "))
    };
    let _ = writeln!(out, "  {:<34} {}{}", cmd.usage, cmd.description, aliases);
  }
  out
}

/// Prompt line, with a count of requests still being saved.
pub fn prompt(project: Option<&str>, pending: usize, unread: usize) -> String {
  let mut prompt = project.unwrap_or("-").to_string();
  if pending > 0 {
    let _ = write!(prompt, " ~{}", pending);
  }
  if unread > 0 {
    let _ = write!(prompt, " !{}", unread);
  }
  prompt.push_str("> ");
  prompt
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Assignee;
  use crate::notifications::NotificationType;

  fn task(id: &str, title: &str, status: TaskStatus) -> Task {
    Task {
      id: id.to_string(),
      title: title.to_string(),
      description: None,
      status,
      assignee: None,
      due_date: None,
    }
  }

  #[test]
  fn test_task_detail_and_matches() {
    let mut task = task("task-101", "Set up repository", TaskStatus::InProgress);
    task.due_date = Some("2025-05-10".to_string());
    let detail = render_task(&task);
    assert!(detail.starts_with("task-101  Set up repository\n"));
    assert!(detail.contains("Status:      In Progress"));
    assert!(detail.contains("Assignee:    Unassigned"));
    assert!(detail.contains("Due:         2025-05-10"));
    assert!(detail.contains("No description provided."));

    let out = render_matches(&[&task], 3, CacheSource::CacheFresh);
    assert!(out.starts_with("1 of 3 tasks\n"));
    assert!(out.contains("[~] task-101"));
    assert!(render_matches(&[], 3, CacheSource::Offline).contains("(no matches)"));
  }

  #[test]
  fn test_board_groups_by_status() {
    let mut done = task("task-2", "Ship it", TaskStatus::Done);
    done.assignee = Some(Assignee {
      id: "user-1".to_string(),
      name: "Alice".to_string(),
    });
    let tasks = vec![
      task("task-1", "Write docs", TaskStatus::Todo),
      done,
      task("temp-abc", "Brand new", TaskStatus::Todo),
    ];

    let out = render_board("proj-1", &tasks, CacheSource::Network);
    assert!(out.starts_with("Tasks [proj-1]\n"));
    assert!(out.contains("To Do (2)"));
    assert!(out.contains("In Progress (0)"));
    assert!(out.contains("Done (1)"));
    assert!(out.contains("@Alice"));
    assert!(out.contains("(saving)"));
    assert!(!out.contains("temp-abc"));
  }

  #[test]
  fn test_offline_note() {
    let out = render_projects(&[], None, CacheSource::Offline);
    assert!(out.starts_with("Projects (offline, showing cached data)"));
  }

  #[test]
  fn test_notifications() {
    let mut center = NotificationCenter::new();
    center.push(NotificationType::Error, "Failed to delete task", Some("Not found".to_string()));
    let out = render_notifications(&center, Utc::now());
    assert!(out.contains("(1, 1 unread)"));
    assert!(out.contains("[error] Failed to delete task (Just now)"));
    assert!(out.contains("Not found"));
  }

  #[test]
  fn test_prompt() {
    assert_eq!(prompt(None, 0, 0), "-> ");
    assert_eq!(prompt(Some("proj-1"), 2, 1), "proj-1 ~2 !1> ");
  }

  #[test]
  fn test_help_lists_every_command() {
    let help = render_help();
    for cmd in COMMANDS {
      assert!(help.contains(cmd.usage));
    }
  }
}
