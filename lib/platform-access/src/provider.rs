//! Narrow interface to the OAuth2/OIDC client library.
//!
//! The session core never talks to the identity provider directly. It
//! drives an [`IdentityProvider`], which owns the token store, and observes
//! the provider's [`ProviderEvent`] stream. Tests substitute a fake.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clickmenos_core::Result;
use tokio::sync::broadcast;
use url::Url;

use crate::claims::IdentityClaims;
use crate::error::AuthenticationError;
use crate::oidc::AuthConfig;

/// Token lifecycle notifications published by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The discovery document was loaded.
    DiscoveryDocumentLoaded,
    /// Loading the discovery document failed.
    DiscoveryDocumentLoadError { reason: String },
    /// Tokens were obtained from an authorization code.
    TokenReceived,
    /// Tokens were renewed by a silent refresh.
    TokenRefreshed,
    /// A silent refresh failed.
    TokenRefreshError { reason: String },
    /// A token response was rejected.
    TokenError { reason: String },
    /// Local token state was cleared.
    Logout,
}

impl ProviderEvent {
    /// Returns the authentication state this event implies, if any.
    ///
    /// Refresh errors imply nothing on their own: the session decides to
    /// log out, which then publishes [`ProviderEvent::Logout`].
    #[must_use]
    pub fn implied_authentication(&self) -> Option<bool> {
        match self {
            Self::TokenReceived | Self::TokenRefreshed => Some(true),
            Self::Logout | Self::TokenError { .. } => Some(false),
            Self::DiscoveryDocumentLoaded
            | Self::DiscoveryDocumentLoadError { .. }
            | Self::TokenRefreshError { .. } => None,
        }
    }
}

/// Issue and expiry instants of the current access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenValidity {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenValidity {
    /// Creates a validity window.
    #[must_use]
    pub fn new(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            issued_at,
            expires_at,
        }
    }

    /// Returns true if the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns the instant at which `factor` of the lifetime has elapsed.
    #[must_use]
    pub fn refresh_at(&self, factor: f64) -> DateTime<Utc> {
        let lifetime_ms = (self.expires_at - self.issued_at).num_milliseconds().max(0);
        let offset_ms = (lifetime_ms as f64 * factor) as i64;
        self.issued_at + Duration::milliseconds(offset_ms)
    }
}

/// Capabilities the session core needs from an OAuth2/OIDC client.
///
/// Implementations own token persistence and serialize their own writes;
/// the session core only reads tokens and observes [`ProviderEvent`]s.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Applies the client configuration.
    fn configure(&self, config: &AuthConfig) -> Result<(), AuthenticationError>;

    /// Loads the provider's discovery document.
    async fn load_discovery_document(&self) -> Result<(), AuthenticationError>;

    /// Loads the discovery document, completes a pending code flow if
    /// `callback` carries an authorization response, and otherwise restores
    /// persisted tokens.
    async fn load_discovery_and_try_login(
        &self,
        callback: Option<&Url>,
    ) -> Result<(), AuthenticationError>;

    /// Returns true if an access token is stored and not expired.
    fn has_valid_access_token(&self) -> bool;

    /// Returns the current access token.
    fn access_token(&self) -> Option<String>;

    /// Returns the validity window of the current access token.
    fn access_token_validity(&self) -> Option<TokenValidity>;

    /// Returns the current raw ID token.
    fn id_token(&self) -> Option<String>;

    /// Returns the claims of the current ID token, decoded on every call.
    fn identity_claims(&self) -> Option<IdentityClaims> {
        let id_token = self.id_token()?;
        match IdentityClaims::from_id_token(&id_token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode identity claims");
                None
            }
        }
    }

    /// Returns the provider's RP-initiated logout endpoint, if advertised.
    fn end_session_endpoint(&self) -> Option<Url>;

    /// Starts an authorization code flow with PKCE and returns the URL the
    /// browser must be sent to.
    async fn init_code_flow(&self) -> Result<Url, AuthenticationError>;

    /// Clears local token state and publishes [`ProviderEvent::Logout`].
    async fn log_out(&self);

    /// Renews tokens without user interaction.
    async fn silent_refresh(&self) -> Result<(), AuthenticationError>;

    /// Subscribes to token lifecycle events.
    fn events(&self) -> broadcast::Receiver<ProviderEvent>;
}
