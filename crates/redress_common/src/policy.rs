//! Role-based access policy.
//!
//! Access is a lookup in [`POLICY`], keyed by `(role, resource, action)`.
//! The resulting [`Scope`] says which subjects the principal may touch.
//! Anything not listed is denied.

use crate::model::{Complaint, Role};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Complaint,
    User,
    Analytics,
    StaffDirectory,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complaint => write!(f, "this complaint"),
            Self::User => write!(f, "this user"),
            Self::Analytics => write!(f, "analytics"),
            Self::StaffDirectory => write!(f, "the staff directory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    /// The whole collection, narrowed by scope
    List,
    /// Only what the principal authored
    ListOwn,
    UpdateStatus,
    Assign,
    UpdatePriority,
    Delete,
    UpdateRole,
    ToggleActive,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "view"),
            Self::List => write!(f, "list"),
            Self::ListOwn => write!(f, "list"),
            Self::UpdateStatus => write!(f, "update"),
            Self::Assign => write!(f, "assign"),
            Self::UpdatePriority => write!(f, "reprioritize"),
            Self::Delete => write!(f, "delete"),
            Self::UpdateRole => write!(f, "change the role of"),
            Self::ToggleActive => write!(f, "change the status of"),
        }
    }
}

/// Which subjects a rule grants access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Deny,
    /// Subjects the principal authored
    Own,
    /// Subjects currently assigned to the principal
    Assigned,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub role: Role,
    pub resource: Resource,
    pub action: Action,
    pub scope: Scope,
}

const fn rule(role: Role, resource: Resource, action: Action, scope: Scope) -> Rule {
    Rule {
        role,
        resource,
        action,
        scope,
    }
}

use Action::*;
use Resource::{Analytics, StaffDirectory};
use Scope::{Any, Assigned, Own};

/// The whole access policy
pub const POLICY: &[Rule] = &[
    // users file and follow their own complaints
    rule(Role::User, Resource::Complaint, Create, Any),
    rule(Role::User, Resource::Complaint, Read, Own),
    rule(Role::User, Resource::Complaint, ListOwn, Own),
    // staff work what is assigned to them
    rule(Role::Staff, Resource::Complaint, Create, Any),
    rule(Role::Staff, Resource::Complaint, Read, Assigned),
    rule(Role::Staff, Resource::Complaint, List, Assigned),
    rule(Role::Staff, Resource::Complaint, ListOwn, Own),
    rule(Role::Staff, Resource::Complaint, UpdateStatus, Assigned),
    // admins
    rule(Role::Admin, Resource::Complaint, Create, Any),
    rule(Role::Admin, Resource::Complaint, Read, Any),
    rule(Role::Admin, Resource::Complaint, List, Any),
    rule(Role::Admin, Resource::Complaint, ListOwn, Own),
    rule(Role::Admin, Resource::Complaint, UpdateStatus, Any),
    rule(Role::Admin, Resource::Complaint, Assign, Any),
    rule(Role::Admin, Resource::Complaint, UpdatePriority, Any),
    rule(Role::Admin, Resource::Complaint, Delete, Any),
    rule(Role::Admin, Resource::User, Read, Any),
    rule(Role::Admin, Resource::User, List, Any),
    rule(Role::Admin, Resource::User, UpdateRole, Any),
    rule(Role::Admin, Resource::User, ToggleActive, Any),
    rule(Role::Admin, Resource::User, Delete, Any),
    rule(Role::Admin, Analytics, Read, Any),
    rule(Role::Admin, StaffDirectory, List, Any),
];

/// Scope granted to `role` for `action` on `resource`
pub fn scope_for(role: Role, resource: Resource, action: Action) -> Scope {
    POLICY
        .iter()
        .find(|r| r.role == role && r.resource == resource && r.action == action)
        .map(|r| r.scope)
        .unwrap_or(Scope::Deny)
}

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Ownership facts about the thing being accessed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subject<'a> {
    pub owner: Option<&'a str>,
    pub assignee: Option<&'a str>,
}

impl<'a> Subject<'a> {
    /// For resources with no owner (analytics, directories, accounts)
    pub fn unowned() -> Self {
        Self::default()
    }

    pub fn complaint(complaint: &'a Complaint) -> Self {
        Self {
            owner: Some(complaint.user_id.as_str()),
            assignee: complaint.assigned_to.as_deref(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Not authorized to {action} {resource}")]
pub struct PolicyError {
    pub role: Role,
    pub resource: Resource,
    pub action: Action,
}

impl Scope {
    /// Whether this scope covers `subject` for `principal`
    pub fn permits(&self, principal: &Principal, subject: &Subject<'_>) -> bool {
        match self {
            Scope::Deny => false,
            Scope::Own => subject.owner == Some(principal.id.as_str()),
            Scope::Assigned => subject.assignee == Some(principal.id.as_str()),
            Scope::Any => true,
        }
    }
}

/// Check a single access against the policy table
pub fn authorize(
    principal: &Principal,
    resource: Resource,
    action: Action,
    subject: &Subject<'_>,
) -> Result<(), PolicyError> {
    if scope_for(principal.role, resource, action).permits(principal, subject) {
        Ok(())
    } else {
        Err(PolicyError {
            role: principal.role,
            resource,
            action,
        })
    }
}

/// Check that the role may perform `action` at all, returning its scope.
/// Used by listings, which turn the scope into a query filter.
pub fn require_scope(
    principal: &Principal,
    resource: Resource,
    action: Action,
) -> Result<Scope, PolicyError> {
    match scope_for(principal.role, resource, action) {
        Scope::Deny => Err(PolicyError {
            role: principal.role,
            resource,
            action,
        }),
        scope => Ok(scope),
    }
}
