//! Authorization oracle seam.
//!
//! Every registry operation names a [`Subject`], an [`Action`], and the
//! repository URL it touches. The registry asks the [`Enforcer`] before any
//! storage access and never consults ambient state for the caller identity.

use std::fmt;

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, bon::Builder)]
pub struct Subject {
    /// Principal name, for example a user or service account.
    #[builder(into)]
    pub name: String,

    /// Groups the principal belongs to.
    #[builder(default)]
    pub groups: Vec<String>,
}

impl Subject {
    /// A subject with no groups.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), groups: Vec::new() }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Resource family being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResourceKind {
    /// Repository and credential-set records.
    Repositories,
}

impl ResourceKind {
    /// Policy name of the resource.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repositories => "repositories",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read or list.
    Get,
    /// Create, or test access before creating.
    Create,
    /// Overwrite.
    Update,
    /// Remove.
    Delete,
}

impl Action {
    /// Policy name of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean policy oracle.
///
/// Any `Fn(&Subject, ResourceKind, Action, &str) -> bool` closure is an
/// enforcer:
///
/// ```
/// use gitops_state_registry::{Action, Enforcer, ResourceKind, Subject};
///
/// let read_only = |_: &Subject, _: ResourceKind, action: Action, _: &str| action == Action::Get;
///
/// let alice = Subject::new("alice");
/// assert!(read_only.enforce(&alice, ResourceKind::Repositories, Action::Get, "git@x/y"));
/// assert!(!read_only.enforce(&alice, ResourceKind::Repositories, Action::Delete, "git@x/y"));
/// ```
pub trait Enforcer: Send + Sync {
    /// Returns `true` if `subject` may perform `action` on `object`.
    fn enforce(&self, subject: &Subject, resource: ResourceKind, action: Action, object: &str)
    -> bool;
}

impl<F> Enforcer for F
where
    F: Fn(&Subject, ResourceKind, Action, &str) -> bool + Send + Sync,
{
    fn enforce(
        &self,
        subject: &Subject,
        resource: ResourceKind,
        action: Action,
        object: &str,
    ) -> bool {
        self(subject, resource, action, object)
    }
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Enforcer for AllowAll {
    fn enforce(&self, _: &Subject, _: ResourceKind, _: Action, _: &str) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_builder_collects_groups() {
        let subject = Subject::builder()
            .name("alice")
            .groups(vec!["admins".to_owned(), "dev".to_owned()])
            .build();
        assert_eq!(subject.groups, vec!["admins".to_owned(), "dev".to_owned()]);
        assert_eq!(subject.to_string(), "alice");
    }

    #[test]
    fn test_closure_enforcer_sees_object() {
        let only_team = |_: &Subject, _: ResourceKind, _: Action, object: &str| {
            object.starts_with("https://github.com/team/")
        };
        let bob = Subject::new("bob");
        let repos = ResourceKind::Repositories;
        assert!(only_team.enforce(&bob, repos, Action::Get, "https://github.com/team/a"));
        assert!(!only_team.enforce(&bob, repos, Action::Get, "https://github.com/other/a"));
        assert!(AllowAll.enforce(&bob, ResourceKind::Repositories, Action::Delete, "anything"));
    }
}
