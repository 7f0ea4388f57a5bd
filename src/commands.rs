use thiserror::Error;

use crate::error::ValidationError;
use crate::model::{TaskFilter, TaskStatus};

/// A shell command with its aliases and usage line
#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "tasks",
    aliases: &["t", "ls"],
    usage: "tasks",
    description: "List tasks in the current project",
  },
  Command {
    name: "show",
    aliases: &["s", "info", "view"],
    usage: "show <task>",
    description: "Show one task in full",
  },
  Command {
    name: "find",
    aliases: &["f", "filter", "search"],
    usage: "find [text] [status=<status>] [assignee=<user|none>]",
    description: "Filter the current project's tasks",
  },
  Command {
    name: "projects",
    aliases: &["p", "project"],
    usage: "projects",
    description: "List projects",
  },
  Command {
    name: "members",
    aliases: &["m", "team"],
    usage: "members",
    description: "List members of the current project",
  },
  Command {
    name: "users",
    aliases: &["u"],
    usage: "users",
    description: "List all users",
  },
  Command {
    name: "use",
    aliases: &["cd", "open"],
    usage: "use <project id or name>",
    description: "Switch the current project",
  },
  Command {
    name: "add",
    aliases: &["a", "new"],
    usage: "add <title> [| description]",
    description: "Create a task",
  },
  Command {
    name: "edit",
    aliases: &["e", "title"],
    usage: "edit <task> <title>",
    description: "Change a task's title",
  },
  Command {
    name: "move",
    aliases: &["mv", "status"],
    usage: "move <task> <todo|doing|done>",
    description: "Change a task's status",
  },
  Command {
    name: "assign",
    aliases: &["as"],
    usage: "assign <task> <user>",
    description: "Assign a task to a project member",
  },
  Command {
    name: "due",
    aliases: &["d"],
    usage: "due <task> <YYYY-MM-DD|none>",
    description: "Set or clear a task's due date",
  },
  Command {
    name: "rm",
    aliases: &["delete", "del"],
    usage: "rm <task>",
    description: "Delete a task",
  },
  Command {
    name: "invite",
    aliases: &["join"],
    usage: "invite <user>",
    description: "Add a user to the current project",
  },
  Command {
    name: "kick",
    aliases: &["leave"],
    usage: "kick <user>",
    description: "Remove a user from the current project",
  },
  Command {
    name: "mkproject",
    aliases: &["np"],
    usage: "mkproject <name> [| description]",
    description: "Create a project",
  },
  Command {
    name: "rename",
    aliases: &[],
    usage: "rename <name>",
    description: "Rename the current project",
  },
  Command {
    name: "rmproject",
    aliases: &["dp"],
    usage: "rmproject <project>",
    description: "Delete a project",
  },
  Command {
    name: "notifications",
    aliases: &["n", "inbox"],
    usage: "notifications",
    description: "Show recent notifications",
  },
  Command {
    name: "read",
    aliases: &["ack"],
    usage: "read [notification]",
    description: "Mark one or all notifications as read",
  },
  Command {
    name: "dismiss",
    aliases: &["dm"],
    usage: "dismiss <notification>",
    description: "Remove a notification",
  },
  Command {
    name: "clear",
    aliases: &[],
    usage: "clear",
    description: "Remove all notifications",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    usage: "refresh",
    description: "Refetch everything on next read",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "Show commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit taskboard",
  },
];

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  ranked(input).into_iter().map(|(cmd, _)| cmd).collect()
}

fn ranked(input: &str) -> Vec<(&'static Command, u32)> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().map(|cmd| (cmd, 0)).collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);
  matches
}

/// Resolve a typed command word.
///
/// Exact names and aliases always resolve. A prefix resolves only when it
/// picks out a single command; fuzzy matches are only suggestions.
pub fn resolve(word: &str) -> Result<&'static Command, ParseError> {
  let ranked = ranked(word);
  if let Some((cmd, _)) = ranked.iter().find(|(_, priority)| *priority <= 1) {
    return Ok(cmd);
  }

  let prefixed: Vec<&'static Command> = ranked
    .iter()
    .filter(|(_, priority)| *priority <= 3)
    .map(|(cmd, _)| *cmd)
    .collect();
  match prefixed.as_slice() {
    [cmd] => Ok(cmd),
    [] => Err(ParseError::Unknown(word.to_string())),
    _ => Err(ParseError::Ambiguous(word.to_string())),
  }
}

/// What the user asked the shell to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  ListTasks,
  ShowTask(String),
  FindTasks(TaskFilter),
  ListProjects,
  ListMembers,
  ListUsers,
  UseProject(String),
  AddTask {
    title: String,
    description: Option<String>,
  },
  EditTitle {
    task_id: String,
    title: String,
  },
  MoveTask {
    task_id: String,
    status: TaskStatus,
  },
  AssignTask {
    task_id: String,
    user: String,
  },
  SetDueDate {
    task_id: String,
    due_date: Option<String>,
  },
  RemoveTask(String),
  Invite(String),
  Kick(String),
  CreateProject {
    name: String,
    description: String,
  },
  RenameProject(String),
  RemoveProject(String),
  ShowNotifications,
  MarkRead(Option<String>),
  Dismiss(String),
  ClearNotifications,
  Refresh,
  Help,
  Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
  #[error("unknown command: {0}")]
  Unknown(String),
  #[error("ambiguous command: {0}")]
  Ambiguous(String),
  #[error("usage: {0}")]
  Usage(&'static str),
  #[error(transparent)]
  Invalid(#[from] ValidationError),
}

impl ParseError {
  /// Close matches for an unknown command word.
  pub fn suggestions(&self) -> Vec<&'static str> {
    match self {
      ParseError::Unknown(word) | ParseError::Ambiguous(word) => {
        get_suggestions(word).iter().map(|c| c.name).collect()
      }
      _ => Vec::new(),
    }
  }
}

/// Split `text` at the first `|` into a trimmed head and optional tail.
fn split_pipe(text: &str) -> (String, Option<String>) {
  match text.split_once('|') {
    Some((head, tail)) => {
      let tail = tail.trim();
      (
        head.trim().to_string(),
        (!tail.is_empty()).then(|| tail.to_string()),
      )
    }
    None => (text.trim().to_string(), None),
  }
}

/// `status=` and `assignee=` terms filter on those fields, every other word
/// is matched against the title.
fn parse_filter(rest: &str) -> Result<TaskFilter, ParseError> {
  let mut filter = TaskFilter::default();
  let mut words = Vec::new();

  for term in rest.split_whitespace() {
    match term.split_once('=') {
      Some(("status", value)) => filter.status = Some(value.parse()?),
      Some(("assignee", value)) if !value.is_empty() => filter.assignee = Some(value.to_string()),
      Some(("assignee", _)) => {
        return Err(ParseError::Usage(
          "find [text] [status=<status>] [assignee=<user|none>]",
        ))
      }
      _ => words.push(term),
    }
  }
  if !words.is_empty() {
    filter.text = Some(words.join(" "));
  }
  Ok(filter)
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Action>, ParseError> {
  let line = line.trim();
  let (word, rest) = match line.split_once(char::is_whitespace) {
    Some((word, rest)) => (word, rest.trim()),
    None => (line, ""),
  };
  if word.is_empty() {
    return Ok(None);
  }

  let cmd = resolve(word)?;
  let usage = || ParseError::Usage(cmd.usage);

  // First argument and the remainder
  let (first, remainder) = match rest.split_once(char::is_whitespace) {
    Some((first, remainder)) => (first, remainder.trim()),
    None => (rest, ""),
  };
  let one = || {
    if first.is_empty() || !remainder.is_empty() {
      Err(usage())
    } else {
      Ok(first.to_string())
    }
  };
  let two = || {
    if first.is_empty() || remainder.is_empty() {
      Err(usage())
    } else {
      Ok((first.to_string(), remainder.to_string()))
    }
  };

  let action = match cmd.name {
    "tasks" => Action::ListTasks,
    "show" => Action::ShowTask(one()?),
    "find" => Action::FindTasks(parse_filter(rest)?),
    "projects" => Action::ListProjects,
    "members" => Action::ListMembers,
    "users" => Action::ListUsers,
    "use" => {
      if rest.is_empty() {
        return Err(usage());
      }
      Action::UseProject(rest.to_string())
    }
    "add" => {
      let (title, description) = split_pipe(rest);
      if title.is_empty() {
        return Err(usage());
      }
      Action::AddTask { title, description }
    }
    "edit" => {
      let (task_id, title) = two()?;
      Action::EditTitle { task_id, title }
    }
    "move" => {
      let (task_id, status) = two()?;
      Action::MoveTask {
        task_id,
        status: status.parse()?,
      }
    }
    "assign" => {
      let (task_id, user) = two()?;
      Action::AssignTask { task_id, user }
    }
    "due" => {
      let (task_id, date) = two()?;
      let due_date = match date.to_lowercase().as_str() {
        "none" | "clear" | "-" => None,
        _ => Some(date),
      };
      Action::SetDueDate { task_id, due_date }
    }
    "rm" => Action::RemoveTask(one()?),
    "invite" => Action::Invite(one()?),
    "kick" => Action::Kick(one()?),
    "mkproject" => {
      let (name, description) = split_pipe(rest);
      if name.is_empty() {
        return Err(usage());
      }
      Action::CreateProject {
        name,
        description: description.unwrap_or_default(),
      }
    }
    "rename" => {
      if rest.is_empty() {
        return Err(usage());
      }
      Action::RenameProject(rest.to_string())
    }
    "rmproject" => Action::RemoveProject(one()?),
    "notifications" => Action::ShowNotifications,
    "read" => {
      if rest.is_empty() {
        Action::MarkRead(None)
      } else {
        Action::MarkRead(Some(one()?))
      }
    }
    "dismiss" => Action::Dismiss(one()?),
    "clear" => Action::ClearNotifications,
    "refresh" => Action::Refresh,
    "help" => Action::Help,
    "quit" => Action::Quit,
    _ => return Err(ParseError::Unknown(word.to_string())),
  };
  Ok(Some(action))
}
