//! Identity claims decoded from the ID token.
//!
//! Keycloak emits group memberships and roles in several shapes depending
//! on realm mappers: a list, a single string, or nested under
//! `realm_access`. [`ClaimValues`] normalizes all of them to a list so the
//! tenant and role derivations below work on one representation.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clickmenos_core::TenantId;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::AuthenticationError;
use crate::role::RoleSet;

/// Group naming convention for tenants: `empresa_<uuid>`, optionally
/// prefixed with the Keycloak group path separator.
static TENANT_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^/?empresa_([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})$",
    )
    .unwrap_or_else(|e| unreachable!("tenant group pattern is valid: {e}"))
});

/// A claim that may be a single string or a list of strings.
///
/// Anything else (numbers, objects, `null`) normalizes to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClaimValues(Vec<String>);

impl ClaimValues {
    /// Normalizes a raw claim value into a list of strings.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self(vec![s.clone()]),
            Value::Array(items) => Self(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect(),
            ),
            _ => Self::default(),
        }
    }

    /// Returns the values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Returns true if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ClaimValues {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl From<Vec<String>> for ClaimValues {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

/// The `realm_access` claim Keycloak uses for realm roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: ClaimValues,
}

/// Claims carried by the current ID token.
///
/// Only the claims the back-office reads are typed; everything else is
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (Keycloak user id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Group memberships; tenants are encoded here.
    #[serde(default)]
    pub groups: ClaimValues,
    /// Top-level roles claim, used when no realm roles are present.
    #[serde(default)]
    pub roles: ClaimValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl IdentityClaims {
    /// Decodes the payload of a compact-serialized ID token.
    ///
    /// The signature is not checked here; the identity provider client
    /// verifies the token before storing it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError::InvalidToken`] if the token is not a
    /// three-part JWT or its payload is not base64url-encoded JSON.
    pub fn from_id_token(id_token: &str) -> Result<Self, AuthenticationError> {
        let parts: Vec<&str> = id_token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthenticationError::InvalidToken {
                reason: "invalid JWT format".to_string(),
            });
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1].trim_end_matches('='))
            .map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("failed to decode JWT payload: {e}"),
            })?;

        serde_json::from_slice(&payload).map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to parse JWT payload: {e}"),
        })
    }

    /// Returns the tenant of the first `empresa_<uuid>` group, in claim order.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.groups.as_slice().iter().find_map(|group| {
            TENANT_GROUP
                .captures(group)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }

    /// Returns realm roles when present, else the top-level roles claim.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        let roles = self
            .realm_access
            .as_ref()
            .map(|access| &access.roles)
            .filter(|roles| !roles.is_empty())
            .unwrap_or(&self.roles);
        RoleSet::new(roles.as_slice().to_vec())
    }

    /// Returns a claim not covered by the typed fields.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
