use chrono::Utc;
use color_eyre::Result;
use std::future::Future;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::CachedBoardClient;
use crate::cache::{CacheEvent, QueryKey};
use crate::commands::{self, Action, ParseError};
use crate::error::MutationError;
use crate::event::{Event, EventHandler};
use crate::model::{NewProject, NewTask, ProjectUpdate};
use crate::notifications::{NotificationCenter, NotificationType};
use crate::ui;

/// Main application state
pub struct App<W: Write> {
  /// Board client shared with spawned mutations
  client: CachedBoardClient,

  /// Project the task commands apply to
  project: Option<String>,

  /// Outcomes of past mutations
  notifications: NotificationCenter,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Where the shell prints
  out: W,

  /// Whether to quit
  should_quit: bool,
}

impl<W: Write> App<W> {
  pub fn new(
    client: CachedBoardClient,
    project: Option<String>,
    event_tx: mpsc::UnboundedSender<Event>,
    out: W,
  ) -> Self {
    Self {
      client,
      project,
      notifications: NotificationCenter::new(),
      event_tx,
      out,
      should_quit: false,
    }
  }

  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    writeln!(self.out, "taskboard. Type `help` for commands.")?;
    if let Some(project) = self.project.clone() {
      self.dispatch(Action::UseProject(project)).await?;
    }
    self.print_prompt()?;

    // Main loop
    while !self.should_quit {
      match events.next().await {
        Some(event) => self.handle_event(event).await?,
        None => break,
      }
    }

    if self.client.pending_mutations() > 0 {
      info!(
        pending = self.client.pending_mutations(),
        "exiting with unsettled mutations"
      );
    }
    Ok(())
  }

  async fn handle_event(&mut self, event: Event) -> Result<()> {
    match event {
      Event::Line(line) => {
        match commands::parse(&line) {
          Ok(Some(action)) => self.dispatch(action).await?,
          Ok(None) => {}
          Err(e) => self.print_parse_error(&e)?,
        }
        if !self.should_quit {
          self.print_prompt()?;
        }
      }
      Event::Eof => self.should_quit = true,
      Event::Mutation { label, result } => {
        self.on_mutation_settled(&label, result)?;
        self.print_prompt()?;
      }
      Event::Cache(CacheEvent::Invalidated(key)) => self.refetch_if_current(&key),
      Event::Cache(_) => {}
    }
    Ok(())
  }

  fn print_prompt(&mut self) -> Result<()> {
    let prompt = ui::prompt(
      self.project.as_deref(),
      self.client.pending_mutations(),
      self.notifications.unread_count(),
    );
    write!(self.out, "{}", prompt)?;
    self.out.flush()?;
    Ok(())
  }

  fn print_parse_error(&mut self, error: &ParseError) -> Result<()> {
    writeln!(self.out, "{}", error)?;
    let suggestions = error.suggestions();
    if !suggestions.is_empty() {
      writeln!(self.out, "Did you mean: {}?", suggestions.join(", "))?;
    }
    Ok(())
  }

  /// Keep the visible project's tasks warm after a mutation settles.
  fn refetch_if_current(&self, key: &QueryKey) {
    let Some(project) = self.project.clone() else {
      return;
    };
    if *key != QueryKey::tasks(&project) || self.client.pending_mutations() > 0 {
      return;
    }

    let client = self.client.clone();
    tokio::spawn(async move {
      if let Err(e) = client.tasks(&project).await {
        debug!(project = %project, error = %e, "background refetch failed");
      }
    });
  }

  fn require_project(&mut self) -> Result<Option<String>> {
    if self.project.is_none() {
      writeln!(self.out, "No project selected. Use `use <project>` first.")?;
    }
    Ok(self.project.clone())
  }

  /// Run a mutation in the background and report its outcome as an event.
  fn spawn_mutation<Fut>(&mut self, label: String, mutation: Fut) -> Result<()>
  where
    Fut: Future<Output = Result<String, MutationError>> + Send + 'static,
  {
    writeln!(self.out, "… {}", label)?;
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      let result = mutation.await;
      let _ = tx.send(Event::Mutation { label, result });
    });
    Ok(())
  }

  fn on_mutation_settled(&mut self, label: &str, result: Result<String, MutationError>) -> Result<()> {
    match result {
      Ok(message) => {
        writeln!(self.out, "✓ {}", message)?;
        self.notifications.push(NotificationType::Success, message, None);
      }
      Err(e) => {
        let reverted = !matches!(e, MutationError::Validation(_));
        let message = format!("Failed to {}", label);
        if reverted {
          writeln!(self.out, "✗ {}: {} (changes reverted)", message, e)?;
        } else {
          writeln!(self.out, "✗ {}: {}", message, e)?;
        }
        let kind = if e.is_recoverable() {
          NotificationType::Warning
        } else {
          NotificationType::Error
        };
        self.notifications.push(kind, message, Some(e.to_string()));
      }
    }
    Ok(())
  }

  pub async fn dispatch(&mut self, action: Action) -> Result<()> {
    debug!(?action, "dispatch");
    match action {
      Action::ListTasks => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        match self.client.tasks(&project).await {
          Ok(tasks) => write!(self.out, "{}", ui::render_board(&project, &tasks.data, tasks.source))?,
          Err(e) => writeln!(self.out, "Failed to load tasks: {}", e)?,
        }
      }
      Action::ShowTask(task_id) => match self.client.task(&task_id).await {
        Ok(task) => write!(self.out, "{}", ui::render_task(&task))?,
        Err(e) => writeln!(self.out, "Failed to load task {}: {}", task_id, e)?,
      },
      Action::FindTasks(filter) => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        match self.client.tasks(&project).await {
          Ok(tasks) => {
            let matches = filter.apply(&tasks.data);
            write!(
              self.out,
              "{}",
              ui::render_matches(&matches, tasks.data.len(), tasks.source)
            )?;
          }
          Err(e) => writeln!(self.out, "Failed to load tasks: {}", e)?,
        }
      }
      Action::ListProjects => match self.client.projects().await {
        Ok(projects) => write!(
          self.out,
          "{}",
          ui::render_projects(&projects.data, self.project.as_deref(), projects.source)
        )?,
        Err(e) => writeln!(self.out, "Failed to load projects: {}", e)?,
      },
      Action::ListMembers => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        match self.client.project_members(&project).await {
          Ok(members) => write!(
            self.out,
            "{}",
            ui::render_users(&format!("Members [{}]", project), &members.data, members.source)
          )?,
          Err(e) => writeln!(self.out, "Failed to load members: {}", e)?,
        }
      }
      Action::ListUsers => match self.client.users().await {
        Ok(users) => write!(self.out, "{}", ui::render_users("Users", &users.data, users.source))?,
        Err(e) => writeln!(self.out, "Failed to load users: {}", e)?,
      },
      Action::UseProject(wanted) => self.use_project(&wanted).await?,
      Action::AddTask { title, description } => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let mut task = NewTask::new(project, title.clone());
        task.description = description;
        let client = self.client.clone();
        self.spawn_mutation(format!("create \"{}\"", title), async move {
          let created = client.create_task(task).await?;
          Ok(format!("Created {} \"{}\"", created.id, created.title))
        })?;
      }
      Action::EditTitle { task_id, title } => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("rename {}", task_id), async move {
          let task = client
            .edit_task(&project, &task_id, |update| update.title = title)
            .await?;
          Ok(format!("Renamed {} to \"{}\"", task.id, task.title))
        })?;
      }
      Action::MoveTask { task_id, status } => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("move {}", task_id), async move {
          let task = client.update_task_status(&project, &task_id, status).await?;
          Ok(format!("Moved {} to {}", task.id, ui::utils::status_label(task.status)))
        })?;
      }
      Action::AssignTask { task_id, user } => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("assign {}", task_id), async move {
          let task = client.assign_task(&project, &task_id, &user).await?;
          let name = task.assignee.map(|a| a.name).unwrap_or_default();
          Ok(format!("Assigned {} to {}", task.id, name))
        })?;
      }
      Action::SetDueDate { task_id, due_date } => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("set due date of {}", task_id), async move {
          let task = client
            .edit_task(&project, &task_id, |update| update.due_date = due_date)
            .await?;
          Ok(match task.due_date {
            Some(due) => format!("{} is due {}", task.id, due),
            None => format!("Cleared due date of {}", task.id),
          })
        })?;
      }
      Action::RemoveTask(task_id) => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("delete {}", task_id), async move {
          client.delete_task(&project, &task_id).await?;
          Ok(format!("Deleted {}", task_id))
        })?;
      }
      Action::Invite(user_id) => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("add {} to {}", user_id, project), async move {
          client.add_project_member(&project, &user_id).await?;
          Ok(format!("Added {} to {}", user_id, project))
        })?;
      }
      Action::Kick(user_id) => {
        let Some(project) = self.require_project()? else {
          return Ok(());
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("remove {} from {}", user_id, project), async move {
          client.remove_project_member(&project, &user_id).await?;
          Ok(format!("Removed {} from {}", user_id, project))
        })?;
      }
      Action::CreateProject { name, description } => {
        let client = self.client.clone();
        self.spawn_mutation(format!("create project \"{}\"", name), async move {
          let project = client.create_project(NewProject { name, description }).await?;
          Ok(format!("Created project {} \"{}\"", project.id, project.name))
        })?;
      }
      Action::RenameProject(name) => {
        let Some(project_id) = self.require_project()? else {
          return Ok(());
        };
        let description = match self.client.projects().await {
          Ok(projects) => projects
            .data
            .into_iter()
            .find(|p| p.id == project_id)
            .map(|p| p.description)
            .unwrap_or_default(),
          Err(e) => {
            writeln!(self.out, "Failed to load projects: {}", e)?;
            return Ok(());
          }
        };
        let client = self.client.clone();
        self.spawn_mutation(format!("rename {}", project_id), async move {
          let project = client
            .update_project(ProjectUpdate {
              project_id,
              name,
              description,
            })
            .await?;
          Ok(format!("Renamed {} to \"{}\"", project.id, project.name))
        })?;
      }
      Action::RemoveProject(project_id) => {
        if self.project.as_deref() == Some(project_id.as_str()) {
          self.project = None;
        }
        let client = self.client.clone();
        self.spawn_mutation(format!("delete project {}", project_id), async move {
          client.delete_project(&project_id).await?;
          Ok(format!("Deleted project {}", project_id))
        })?;
      }
      Action::ShowNotifications => {
        write!(
          self.out,
          "{}",
          ui::render_notifications(&self.notifications, Utc::now())
        )?;
      }
      Action::MarkRead(None) => {
        self.notifications.mark_all_read();
        writeln!(self.out, "All notifications marked as read")?;
      }
      Action::MarkRead(Some(id)) => {
        if !self.notifications.mark_read(&id) {
          writeln!(self.out, "No such notification: {}", id)?;
        }
      }
      Action::Dismiss(id) => {
        if self.notifications.remove(&id).is_none() {
          writeln!(self.out, "No such notification: {}", id)?;
        }
      }
      Action::ClearNotifications => {
        self.notifications.clear();
        writeln!(self.out, "Notifications cleared")?;
      }
      Action::Refresh => {
        self.client.refresh_all();
        writeln!(self.out, "Cached data will be refetched")?;
      }
      Action::Help => write!(self.out, "{}", ui::render_help())?,
      Action::Quit => self.should_quit = true,
    }
    Ok(())
  }

  /// Switch to a project by id or name, then show its board.
  async fn use_project(&mut self, wanted: &str) -> Result<()> {
    let projects = match self.client.projects().await {
      Ok(projects) => projects.data,
      Err(e) => {
        writeln!(self.out, "Failed to load projects: {}", e)?;
        return Ok(());
      }
    };

    let Some(project) = projects
      .into_iter()
      .find(|p| p.id == wanted || p.name.eq_ignore_ascii_case(wanted))
    else {
      writeln!(self.out, "No such project: {}", wanted)?;
      return Ok(());
    };

    info!(project = %project.id, "switching project");
    self.project = Some(project.id.clone());
    match self.client.open_project(&project.id).await {
      Ok((tasks, members)) => {
        writeln!(self.out, "{} ({} members)", project.name, members.data.len())?;
        let board = ui::render_board(&project.id, &tasks.data, tasks.source);
        write!(self.out, "{}", board)?;
      }
      Err(e) => writeln!(self.out, "Failed to load {}: {}", project.id, e)?,
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::MockApi;
  use crate::cache::CacheSource;
  use crate::config::CacheConfig;
  use crate::model::TaskStatus;
  use crate::notifications::NotificationType;
  use std::sync::Arc;

  struct Harness {
    api: Arc<MockApi>,
    app: App<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Event>,
  }

  impl Harness {
    fn new() -> Self {
      let api = Arc::new(MockApi::new());
      let client = CachedBoardClient::new(api.clone(), &CacheConfig::default());
      let (tx, rx) = mpsc::unbounded_channel();
      let app = App::new(client, None, tx, Vec::new());
      Self { api, app, rx }
    }

    /// Feed a line as if typed, returning what was printed.
    async fn line(&mut self, line: &str) -> String {
      self.app.handle_event(Event::Line(line.to_string())).await.unwrap();
      self.take_output()
    }

    /// Wait for the next mutation outcome and handle it.
    async fn settle(&mut self) -> String {
      loop {
        let event = self.rx.recv().await.unwrap();
        let done = matches!(event, Event::Mutation { .. });
        self.app.handle_event(event).await.unwrap();
        if done {
          return self.take_output();
        }
      }
    }

    fn take_output(&mut self) -> String {
      String::from_utf8(std::mem::take(&mut self.app.out)).unwrap()
    }
  }

  #[tokio::test]
  async fn test_use_project_by_name() {
    let mut h = Harness::new();
    let out = h.line("use mobile").await;
    assert!(out.contains("No such project: mobile"));

    let out = h.line("use mobile mvp").await;
    assert!(out.contains("Mobile MVP (1 members)"));
    assert!(out.ends_with("proj-2> "));

    let out = h.line("use proj-1").await;
    assert!(out.contains("Frontend Refactor (2 members)"));
    assert!(out.contains("Setup state store"));
    assert!(out.ends_with("proj-1> "));
  }

  #[tokio::test]
  async fn test_task_commands_need_project() {
    let mut h = Harness::new();
    let out = h.line("rm task-101").await;
    assert!(out.contains("No project selected"));
    assert_eq!(h.api.call_count(), 0);
  }

  #[tokio::test]
  async fn test_move_success_notifies() {
    let mut h = Harness::new();
    h.line("use proj-1").await;
    h.line("move task-102 done").await;

    let out = h.settle().await;
    assert!(out.contains("✓ Moved task-102 to Done"));
    assert_eq!(h.app.notifications.unread_count(), 1);
    let stored = h.api.stored_tasks("proj-1");
    assert_eq!(stored[1].status, TaskStatus::Done);
  }

  #[tokio::test]
  async fn test_failed_mutation_reverts_and_warns() {
    let mut h = Harness::new();
    h.line("use proj-1").await;
    h.api.fail_next(1);
    h.line("rm task-101").await;

    let out = h.settle().await;
    assert!(out.contains("✗ Failed to delete task-101"));
    assert!(out.contains("(changes reverted)"));
    let latest = h.app.notifications.iter().next().unwrap();
    assert_eq!(latest.kind, NotificationType::Warning);

    let out = h.line("tasks").await;
    assert!(out.contains("task-101"));
  }

  #[tokio::test]
  async fn test_validation_failure_is_not_reverted() {
    let mut h = Harness::new();
    h.line("use proj-1").await;
    h.line("add ab").await;

    let out = h.settle().await;
    assert!(out.contains("✗ Failed to create \"ab\""));
    assert!(!out.contains("reverted"));
    let latest = h.app.notifications.iter().next().unwrap();
    assert_eq!(latest.kind, NotificationType::Error);
  }

  #[tokio::test]
  async fn test_unknown_command_suggests() {
    let mut h = Harness::new();
    let out = h.line("sign").await;
    assert!(out.contains("unknown command: sign"));
    assert!(out.contains("Did you mean: assign?"));
  }

  #[tokio::test]
  async fn test_notification_commands() {
    let mut h = Harness::new();
    let out = h.line("notifications").await;
    assert!(out.contains("0 unread"));

    h.line("use proj-1").await;
    h.line("move task-101 todo").await;
    h.settle().await;
    h.line("invite user-3").await;
    h.settle().await;
    assert_eq!(h.app.notifications.unread_count(), 2);

    let id = h.app.notifications.iter().next().unwrap().id.clone();
    h.line(&format!("read {}", id)).await;
    assert_eq!(h.app.notifications.unread_count(), 1);
    let out = h.line("read nope").await;
    assert!(out.contains("No such notification: nope"));

    h.line(&format!("dismiss {}", id)).await;
    assert_eq!(h.app.notifications.len(), 1);
    h.line("read").await;
    assert_eq!(h.app.notifications.unread_count(), 0);
    h.line("clear").await;
    assert!(h.app.notifications.is_empty());

    h.line("quit").await;
    assert!(h.app.should_quit);
  }

  #[tokio::test]
  async fn test_use_project_shows_offline_source() {
    let mut h = Harness::new();
    h.line("use proj-1").await;
    h.line("refresh").await;
    h.api.set_offline(true);

    let out = h.line("use proj-1").await;
    assert!(out.contains("Frontend Refactor (2 members)"));
    assert!(out.contains(ui::source_note(CacheSource::Offline).unwrap()));
  }

  #[tokio::test]
  async fn test_show_and_find() {
    let mut h = Harness::new();
    let out = h.line("show task-101").await;
    assert!(out.contains("task-101  Setup state store"));
    let out = h.line("show t9").await;
    assert!(out.contains("Failed to load task t9"));

    let out = h.line("find state").await;
    assert!(out.contains("No project selected"));

    h.line("use proj-1").await;
    let out = h.line("find STATE").await;
    assert!(out.contains("1 of 2 tasks"));
    assert!(out.contains("task-101"));
    assert!(!out.contains("task-102"));

    let out = h.line("find status=done").await;
    assert!(out.contains("0 of 2 tasks"));
  }

  #[tokio::test]
  async fn test_ambiguous_prefix_does_nothing() {
    let mut h = Harness::new();
    h.line("use proj-1").await;
    h.line("move task-101 todo").await;
    h.settle().await;

    let out = h.line("c").await;
    assert!(out.contains("ambiguous command: c"));
    assert!(out.contains("clear"));
    assert_eq!(h.app.notifications.len(), 1);
  }
}
