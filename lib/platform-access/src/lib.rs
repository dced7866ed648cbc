//! Session lifecycle and claims-based authorization for the ClickMenos
//! back-office.
//!
//! This crate provides:
//! - Client configuration for an OIDC authorization-code + PKCE login (`AuthConfig`)
//! - The identity provider seam (`IdentityProvider`, `ProviderEvent`)
//! - Observable session flags (`SessionState`)
//! - The session lifecycle and consumer contract (`AuthService`)
//! - Login-route redirects and logout navigation (`RedirectController`)
//! - Tenant and role extraction from ID token claims (`IdentityClaims`, `RoleSet`)
//!
//! # Access Control Model
//!
//! The tenant of a user is the UUID in their `empresa_<uuid>` group. Roles
//! come from `realm_access.roles`, falling back to a top-level `roles` claim.
//! Each application role is granted by either of two spellings, for example
//! `Gerente` or `gerente-clickmenos` for a sales manager.
//!
//! # Example
//!
//! ```
//! use clickmenos_platform_access::{AuthConfig, Role, RoleSet};
//!
//! let config = AuthConfig::builder(
//!     "https://sso.example.com/realms/clickmenos".to_string(),
//!     "backoffice".to_string(),
//!     "https://admin.example.com/".to_string(),
//!     "https://admin.example.com/".to_string(),
//! )
//! .add_scope("offline_access")
//! .build();
//! assert!(config.validate().is_ok());
//!
//! let roles = RoleSet::new(vec!["gerente-clickmenos".to_string()]);
//! assert!(roles.has(Role::Manager));
//! assert!(!roles.is_admin());
//! ```

pub mod auth;
pub mod claims;
pub mod error;
pub mod oidc;
pub mod provider;
pub mod redirect;
pub mod role;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use auth::AuthService;
pub use claims::{ClaimValues, IdentityClaims, RealmAccess};
pub use error::{AuthenticationError, AuthorizationError};
pub use oidc::{AuthConfig, AuthConfigBuilder};
pub use provider::{IdentityProvider, ProviderEvent, TokenValidity};
pub use redirect::{
    LOGIN_ROUTE, LogoutNavigation, Navigator, ROOT_ROUTE, RedirectController, logout_navigation,
};
pub use role::{Role, RoleSet};
pub use session::{SessionPhase, SessionSnapshot, SessionState};
