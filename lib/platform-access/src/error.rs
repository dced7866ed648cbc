//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthenticationError`: Failures talking to the identity provider or
//!   handling its tokens
//! - `AuthorizationError`: Failures of role checks on the current session

use std::fmt;

/// Errors from authentication operations.
///
/// None of these are fatal to the session core: bootstrap, login and
/// refresh log them and degrade to an unauthenticated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The client configuration is unusable (bad URL, HTTP issuer, ...).
    Configuration { reason: String },
    /// The discovery document could not be loaded or parsed.
    Discovery { reason: String },
    /// An operation needed the discovery document before it was loaded.
    DiscoveryNotLoaded,
    /// The identity provider returned an error on the authorization callback.
    AuthorizationDenied { error: String },
    /// The callback state does not match the pending authorization.
    StateMismatch,
    /// Exchanging the authorization code for tokens failed.
    TokenExchange { reason: String },
    /// A token failed validation or could not be decoded.
    InvalidToken { reason: String },
    /// Silent refresh failed.
    RefreshFailed { reason: String },
    /// Silent refresh did not finish within the configured timeout.
    RefreshTimedOut { seconds: u64 },
    /// Reading or writing persisted tokens failed.
    Storage { reason: String },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "invalid identity provider configuration: {reason}")
            }
            Self::Discovery { reason } => {
                write!(f, "discovery document could not be loaded: {reason}")
            }
            Self::DiscoveryNotLoaded => write!(f, "discovery document not loaded"),
            Self::AuthorizationDenied { error } => {
                write!(f, "identity provider denied authorization: {error}")
            }
            Self::StateMismatch => {
                write!(f, "authorization state does not match the pending login")
            }
            Self::TokenExchange { reason } => write!(f, "token exchange failed: {reason}"),
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::RefreshFailed { reason } => write!(f, "silent refresh failed: {reason}"),
            Self::RefreshTimedOut { seconds } => {
                write!(f, "silent refresh timed out after {seconds}s")
            }
            Self::Storage { reason } => write!(f, "token storage error: {reason}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from authorization operations.
///
/// These errors represent failures in role checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// User is not authenticated.
    NotAuthenticated,
    /// The session lacks the required role.
    MissingRole { role: String },
    /// The session carries no tenant group.
    MissingTenant,
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "user is not authenticated"),
            Self::MissingRole { role } => write!(f, "user lacks role: {role}"),
            Self::MissingTenant => write!(f, "user has no tenant (empresa) group"),
        }
    }
}

impl std::error::Error for AuthorizationError {}
