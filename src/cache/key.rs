//! Query identities used as cache keys.

use std::fmt;

/// Identity of a cached query, the `(entity kind, scope id)` pair.
///
/// Two keys are the same cache entry exactly when they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// Tasks belonging to one project
  Tasks { project_id: String },
  /// All projects visible to the session
  Projects,
  /// Users that can be assigned tasks in one project
  ProjectMembers { project_id: String },
  /// Every user
  Users,
}

impl QueryKey {
  pub fn tasks(project_id: impl Into<String>) -> Self {
    Self::Tasks {
      project_id: project_id.into(),
    }
  }

  pub fn project_members(project_id: impl Into<String>) -> Self {
    Self::ProjectMembers {
      project_id: project_id.into(),
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Tasks { .. } => "tasks",
      Self::Projects => "projects",
      Self::ProjectMembers { .. } => "project-members",
      Self::Users => "users",
    }
  }

  pub fn scope(&self) -> Option<&str> {
    match self {
      Self::Tasks { project_id } | Self::ProjectMembers { project_id } => Some(project_id),
      Self::Projects | Self::Users => None,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.scope() {
      Some(scope) => write!(f, "{}:{}", self.kind(), scope),
      None => f.write_str(self.kind()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn test_display() {
    assert_eq!(QueryKey::tasks("p1").to_string(), "tasks:p1");
    assert_eq!(QueryKey::Projects.to_string(), "projects");
    assert_eq!(QueryKey::project_members("p2").to_string(), "project-members:p2");
  }

  #[test]
  fn test_scoped_keys_are_distinct() {
    let keys: HashSet<QueryKey> = [
      QueryKey::tasks("p1"),
      QueryKey::tasks("p1"),
      QueryKey::tasks("p2"),
      QueryKey::project_members("p1"),
    ]
    .into_iter()
    .collect();
    assert_eq!(keys.len(), 3);
  }
}
