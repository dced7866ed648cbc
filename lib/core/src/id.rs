//! Strongly-typed identifiers for domain entities.
//!
//! Tenants ("empresas") are identified by the UUID carried in the
//! identity provider's group names, so `TenantId` wraps a UUID rather
//! than a generated identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Identifier of the company (tenant) that scopes a user's data access.
///
/// Displays as the lowercase hyphenated UUID, which is the form the
/// back-office API expects in tenant-scoped requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a tenant ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TenantId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|e| ParseIdError {
            id_type: "TenantId",
            reason: e.to_string(),
        })
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TenantId> for Uuid {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TENANT: &str = "3f2b8c1e-9a4d-4e6f-8b7a-1c2d3e4f5a6b";

    #[test]
    fn parse_lowercase() {
        let id: TenantId = TENANT.parse().expect("should parse");
        assert_eq!(id.to_string(), TENANT);
    }

    #[test]
    fn parse_uppercase_displays_lowercase() {
        let id: TenantId = TENANT.to_uppercase().parse().expect("should parse");
        assert_eq!(id.to_string(), TENANT);
    }

    #[test]
    fn parse_invalid_uuid() {
        let result: Result<TenantId, _> = "not-a-uuid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "TenantId");
    }

    #[test]
    fn uuid_conversions() {
        let uuid = Uuid::new_v4();
        let id = TenantId::from(uuid);
        assert_eq!(id.as_uuid(), uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(TenantId::from_uuid(uuid), id);
    }

    #[test]
    fn serializes_as_plain_uuid() {
        let id: TenantId = TENANT.parse().expect("should parse");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{TENANT}\""));
        let parsed: TenantId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }
}
