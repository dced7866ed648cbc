//! Role types for back-office access control.
//!
//! Roles come from the identity provider as plain strings. Historical
//! Keycloak realms used a human-facing name ("Admin") while newer ones use
//! a system name ("admin-clickmenos"), so every named role accepts both.

use serde::{Deserialize, Serialize};

/// Back-office role recognized by feature modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access.
    Admin,
    /// Sales manager (gerente).
    Manager,
    /// Salesperson (vendedor).
    Salesperson,
}

impl Role {
    /// Returns the human-facing and the system name of this role.
    #[must_use]
    pub fn aliases(&self) -> [&'static str; 2] {
        match self {
            Self::Admin => ["Admin", "admin-clickmenos"],
            Self::Manager => ["Gerente", "gerente-clickmenos"],
            Self::Salesperson => ["Vendedor", "vendedor-clickmenos"],
        }
    }
}

/// Roles granted to the current session, in claim order.
///
/// Membership tests are exact and case-sensitive; duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet {
    roles: Vec<String>,
}

impl RoleSet {
    /// Creates a role set from raw role names.
    #[must_use]
    pub fn new(roles: Vec<String>) -> Self {
        Self { roles }
    }

    /// Creates an empty role set.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns true if `role` is exactly one of the granted role names.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns true if either alias of `role` is granted.
    #[must_use]
    pub fn has(&self, role: Role) -> bool {
        role.aliases().iter().any(|alias| self.has_role(alias))
    }

    /// Returns true if the session is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has(Role::Admin)
    }

    /// Returns true if the session is a sales manager.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.has(Role::Manager)
    }

    /// Returns true if the session is a salesperson.
    #[must_use]
    pub fn is_salesperson(&self) -> bool {
        self.has(Role::Salesperson)
    }

    /// Returns the role names as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.roles
    }

    /// Returns true if no roles are granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
