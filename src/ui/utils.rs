use crate::model::TaskStatus;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Column heading for a task status
pub fn status_label(status: TaskStatus) -> &'static str {
  match status {
    TaskStatus::Todo => "To Do",
    TaskStatus::InProgress => "In Progress",
    TaskStatus::Done => "Done",
  }
}

/// Marker shown in front of a task line
pub fn status_marker(status: TaskStatus) -> &'static str {
  match status {
    TaskStatus::Todo => "[ ]",
    TaskStatus::InProgress => "[~]",
    TaskStatus::Done => "[x]",
  }
}

/// Optimistic rows that have no server id yet
pub fn is_pending_id(id: &str) -> bool {
  id.starts_with("temp-")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("héllo wörld", 8), "héllo...");
  }

  #[test]
  fn test_status_label() {
    assert_eq!(status_label(TaskStatus::Todo), "To Do");
    assert_eq!(status_label(TaskStatus::InProgress), "In Progress");
    assert_eq!(status_label(TaskStatus::Done), "Done");
  }
}
