//! In-session notification feed for mutation outcomes.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

/// Oldest notifications are dropped past this many.
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationType {
  #[default]
  Info,
  Success,
  Warning,
  Error,
}

impl fmt::Display for NotificationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      NotificationType::Info => "info",
      NotificationType::Success => "ok",
      NotificationType::Warning => "warn",
      NotificationType::Error => "error",
    };
    f.write_str(label)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub id: String,
  pub kind: NotificationType,
  pub message: String,
  pub description: Option<String>,
  pub timestamp: DateTime<Utc>,
  pub read: bool,
}

/// Newest-first list of notifications.
#[derive(Debug, Default)]
pub struct NotificationCenter {
  items: VecDeque<Notification>,
}

impl NotificationCenter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(
    &mut self,
    kind: NotificationType,
    message: impl Into<String>,
    description: Option<String>,
  ) -> &Notification {
    let id = Uuid::new_v4().simple().to_string();
    self.items.push_front(Notification {
      id: id[..9].to_string(),
      kind,
      message: message.into(),
      description,
      timestamp: Utc::now(),
      read: false,
    });
    self.items.truncate(MAX_NOTIFICATIONS);
    &self.items[0]
  }

  pub fn iter(&self) -> impl Iterator<Item = &Notification> {
    self.items.iter()
  }

  pub fn unread(&self) -> impl Iterator<Item = &Notification> {
    self.items.iter().filter(|n| !n.read)
  }

  pub fn unread_count(&self) -> usize {
    self.unread().count()
  }

  /// Returns false if no notification has this id.
  pub fn mark_read(&mut self, id: &str) -> bool {
    match self.items.iter_mut().find(|n| n.id == id) {
      Some(n) => {
        n.read = true;
        true
      }
      None => false,
    }
  }

  pub fn mark_all_read(&mut self) {
    for n in &mut self.items {
      n.read = true;
    }
  }

  pub fn remove(&mut self, id: &str) -> Option<Notification> {
    let index = self.items.iter().position(|n| n.id == id)?;
    self.items.remove(index)
  }

  pub fn clear(&mut self) {
    self.items.clear();
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// Short human form of how long ago `then` was.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now - then;
  let mins = elapsed.num_minutes();
  let hours = elapsed.num_hours();
  let days = elapsed.num_days();

  if mins < 1 {
    "Just now".to_string()
  } else if mins < 60 {
    format!("{} min ago", mins)
  } else if hours < 24 {
    format!("{} hour{} ago", hours, if hours > 1 { "s" } else { "" })
  } else if days < 7 {
    format!("{} day{} ago", days, if days > 1 { "s" } else { "" })
  } else {
    then.format("%d %b %H:%M").to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  #[test]
  fn test_newest_first_and_capped() {
    let mut center = NotificationCenter::new();
    for i in 0..(MAX_NOTIFICATIONS + 5) {
      center.push(NotificationType::Info, format!("n{}", i), None);
    }

    assert_eq!(center.len(), MAX_NOTIFICATIONS);
    let newest = center.iter().next().unwrap();
    assert_eq!(newest.message, format!("n{}", MAX_NOTIFICATIONS + 4));
    assert_eq!(center.iter().last().unwrap().message, "n5");
    assert_eq!(center.unread_count(), MAX_NOTIFICATIONS);
  }

  #[test]
  fn test_read_and_remove() {
    let mut center = NotificationCenter::new();
    let first = center.push(NotificationType::Success, "Task created", None).id.clone();
    let second = center
      .push(
        NotificationType::Error,
        "Failed to move task",
        Some("Service unavailable".to_string()),
      )
      .id
      .clone();
    assert_ne!(first, second);
    assert_eq!(center.unread_count(), 2);

    assert!(center.mark_read(&first));
    assert!(center.mark_read(&first));
    assert!(!center.mark_read("missing"));
    assert_eq!(center.unread_count(), 1);
    assert!(center.iter().find(|n| n.id == first).unwrap().read);

    let removed = center.remove(&second).unwrap();
    assert_eq!(removed.kind, NotificationType::Error);
    assert_eq!(center.unread_count(), 0);
    assert!(center.remove(&second).is_none());

    center.push(NotificationType::Info, "Again", None);
    center.mark_all_read();
    assert_eq!(center.unread_count(), 0);
    center.clear();
    assert!(center.is_empty());
  }

  #[test]
  fn test_relative_time() {
    let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
    assert_eq!(relative_time(now - Duration::seconds(30), now), "Just now");
    assert_eq!(relative_time(now - Duration::minutes(5), now), "5 min ago");
    assert_eq!(relative_time(now - Duration::hours(1), now), "1 hour ago");
    assert_eq!(relative_time(now - Duration::hours(3), now), "3 hours ago");
    assert_eq!(relative_time(now - Duration::days(2), now), "2 days ago");
    assert_eq!(relative_time(now - Duration::days(30), now), "10 Apr 12:00");
  }
}
