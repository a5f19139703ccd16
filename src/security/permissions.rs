// src/security/permissions.rs — Role lookup and command permissions
//
// A username maps to at most one role; admin is checked before user. A `*`
// entry in a role's member list matches every username, and a `*` entry in
// a role's command list allows every command.

use std::collections::HashSet;
use std::fmt;

use crate::dispatch::command::Command;
use crate::infra::config::{PermissionsConfig, RolesConfig};

const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::User => f.write_str("user"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RoleEntry {
    members: HashSet<String>,
    commands: HashSet<String>,
}

impl RoleEntry {
    fn new(members: &[String], commands: &[String]) -> Self {
        Self {
            members: members.iter().cloned().collect(),
            commands: commands.iter().cloned().collect(),
        }
    }

    fn has_member(&self, username: &str) -> bool {
        self.members.contains(WILDCARD) || self.members.contains(username)
    }

    fn allows(&self, command: Command) -> bool {
        self.commands.contains(WILDCARD) || self.commands.contains(command.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleBook {
    admin: RoleEntry,
    user: RoleEntry,
}

impl RoleBook {
    pub fn new(roles: &RolesConfig, permissions: &PermissionsConfig) -> Self {
        Self {
            admin: RoleEntry::new(&roles.admin, &permissions.admin),
            user: RoleEntry::new(&roles.user, &permissions.user),
        }
    }

    fn entry(&self, role: Role) -> &RoleEntry {
        match role {
            Role::Admin => &self.admin,
            Role::User => &self.user,
        }
    }

    pub fn role_of(&self, username: &str) -> Option<Role> {
        [Role::Admin, Role::User]
            .into_iter()
            .find(|role| self.entry(*role).has_member(username))
    }

    pub fn allowed(&self, role: Role, command: Command) -> bool {
        self.entry(role).allows(command)
    }

    /// Role lookup and permission check in one step. Unknown users are
    /// denied everything.
    pub fn can_run(&self, username: &str, command: Command) -> bool {
        self.role_of(username)
            .is_some_and(|role| self.allowed(role, command))
    }

    /// Commands a role may run, in declaration order.
    pub fn commands_for(&self, role: Role) -> Vec<Command> {
        Command::ALL
            .into_iter()
            .filter(|c| self.allowed(role, *c))
            .collect()
    }
}
