//! OIDC (OpenID Connect) client configuration.
//!
//! This module provides the configuration handed to the identity-provider
//! client: issuer, client id, redirect URIs, requested scopes, and the
//! silent-refresh parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthenticationError;

/// Configuration for the OIDC identity provider (Keycloak).
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The OIDC issuer URL (e.g., "https://sso.example.com/realms/clickmenos").
    /// Used for OIDC discovery.
    issuer: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// Where the provider sends the browser back with the authorization response.
    redirect_uri: String,
    /// Where the provider sends the browser after an RP-initiated logout.
    post_logout_redirect_uri: String,
    /// OAuth2 response type. Only the authorization code flow is supported.
    /// Default: "code"
    #[serde(default = "default_response_type")]
    response_type: String,
    /// Space-separated scopes to request.
    /// Default: "openid profile email roles"
    #[serde(default = "default_scope")]
    scope: String,
    /// Reject issuers that are not served over HTTPS.
    /// Default: true
    #[serde(default = "default_require_https")]
    require_https: bool,
    /// Log token lifecycle details at debug level.
    #[serde(default)]
    show_debug_information: bool,
    /// Redirect target used by iframe-based renewals, when the provider needs one.
    #[serde(default)]
    silent_refresh_redirect_uri: Option<String>,
    /// Arm the automatic silent-refresh timer after a successful bootstrap.
    /// Default: true
    #[serde(default = "default_silent_refresh")]
    silent_refresh: bool,
    /// Upper bound for a single silent refresh, in seconds.
    /// Default: 20
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    /// Fraction of the access token lifetime after which the timer refreshes.
    /// Default: 0.75
    #[serde(default = "default_timeout_factor")]
    timeout_factor: f64,
}

fn default_response_type() -> String {
    "code".to_string()
}

fn default_scope() -> String {
    "openid profile email roles".to_string()
}

fn default_require_https() -> bool {
    true
}

fn default_silent_refresh() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_timeout_factor() -> f64 {
    0.75
}

impl AuthConfig {
    /// Creates a new configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        issuer: String,
        client_id: String,
        redirect_uri: String,
        post_logout_redirect_uri: String,
    ) -> Self {
        Self {
            issuer,
            client_id,
            redirect_uri,
            post_logout_redirect_uri,
            response_type: default_response_type(),
            scope: default_scope(),
            require_https: default_require_https(),
            show_debug_information: false,
            silent_refresh_redirect_uri: None,
            silent_refresh: default_silent_refresh(),
            timeout_seconds: default_timeout_seconds(),
            timeout_factor: default_timeout_factor(),
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        issuer: String,
        client_id: String,
        redirect_uri: String,
        post_logout_redirect_uri: String,
    ) -> AuthConfigBuilder {
        AuthConfigBuilder {
            config: Self::new(issuer, client_id, redirect_uri, post_logout_redirect_uri),
        }
    }

    /// Checks that the configuration can drive an authorization code flow.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError::Configuration`] when a URL does not
    /// parse, the response type is not `code`, or the issuer is not HTTPS
    /// while `require_https` is set.
    pub fn validate(&self) -> Result<(), AuthenticationError> {
        let issuer = parse_url("issuer", &self.issuer)?;
        parse_url("redirect_uri", &self.redirect_uri)?;
        parse_url("post_logout_redirect_uri", &self.post_logout_redirect_uri)?;
        if let Some(uri) = &self.silent_refresh_redirect_uri {
            parse_url("silent_refresh_redirect_uri", uri)?;
        }

        if self.response_type != "code" {
            return Err(AuthenticationError::Configuration {
                reason: format!("unsupported response type '{}'", self.response_type),
            });
        }

        if self.require_https && issuer.scheme() != "https" {
            return Err(AuthenticationError::Configuration {
                reason: format!("issuer must use https: {}", self.issuer),
            });
        }

        if !(self.timeout_factor > 0.0 && self.timeout_factor <= 1.0) {
            return Err(AuthenticationError::Configuration {
                reason: format!("timeout factor out of range: {}", self.timeout_factor),
            });
        }

        Ok(())
    }

    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the authorization redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the post-logout redirect URI.
    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> &str {
        &self.post_logout_redirect_uri
    }

    /// Returns the OAuth2 response type.
    #[must_use]
    pub fn response_type(&self) -> &str {
        &self.response_type
    }

    /// Returns the requested scopes, parsed from the space-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }

    /// Returns the raw scope string.
    #[must_use]
    pub fn scope_raw(&self) -> &str {
        &self.scope
    }

    /// Returns true if the issuer must be served over HTTPS.
    #[must_use]
    pub fn require_https(&self) -> bool {
        self.require_https
    }

    /// Returns true if token lifecycle details should be logged.
    #[must_use]
    pub fn show_debug_information(&self) -> bool {
        self.show_debug_information
    }

    /// Returns the silent-refresh redirect URI, if configured.
    #[must_use]
    pub fn silent_refresh_redirect_uri(&self) -> Option<&str> {
        self.silent_refresh_redirect_uri.as_deref()
    }

    /// Returns true if the automatic silent-refresh timer is enabled.
    #[must_use]
    pub fn silent_refresh(&self) -> bool {
        self.silent_refresh
    }

    /// Returns the upper bound for one silent refresh.
    #[must_use]
    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Returns the fraction of token lifetime after which to refresh.
    #[must_use]
    pub fn timeout_factor(&self) -> f64 {
        self.timeout_factor
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url, AuthenticationError> {
    Url::parse(value).map_err(|e| AuthenticationError::Configuration {
        reason: format!("{field}: {e}"),
    })
}

/// Builder for `AuthConfig`.
#[derive(Debug)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Sets the space-separated scopes to request.
    #[must_use]
    pub fn scope(mut self, scope: String) -> Self {
        self.config.scope = scope;
        self
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: &str) -> Self {
        if !self.config.scopes().contains(&scope) {
            self.config.scope.push(' ');
            self.config.scope.push_str(scope);
        }
        self
    }

    /// Sets whether the issuer must be served over HTTPS.
    #[must_use]
    pub fn require_https(mut self, require: bool) -> Self {
        self.config.require_https = require;
        self
    }

    /// Enables debug logging of the token lifecycle.
    #[must_use]
    pub fn show_debug_information(mut self, show: bool) -> Self {
        self.config.show_debug_information = show;
        self
    }

    /// Sets the silent-refresh redirect URI.
    #[must_use]
    pub fn silent_refresh_redirect_uri(mut self, uri: String) -> Self {
        self.config.silent_refresh_redirect_uri = Some(uri);
        self
    }

    /// Enables or disables the automatic silent-refresh timer.
    #[must_use]
    pub fn silent_refresh(mut self, enabled: bool) -> Self {
        self.config.silent_refresh = enabled;
        self
    }

    /// Sets the silent-refresh timeout in seconds.
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Sets the fraction of token lifetime after which to refresh.
    #[must_use]
    pub fn timeout_factor(mut self, factor: f64) -> Self {
        self.config.timeout_factor = factor;
        self
    }

    /// Builds the `AuthConfig`.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig::new(
            "https://sso.example.com/realms/clickmenos".to_string(),
            "backoffice".to_string(),
            "https://admin.example.com/".to_string(),
            "https://admin.example.com/".to_string(),
        )
    }

    #[test]
    fn new_config_has_defaults() {
        let config = test_config();

        assert_eq!(config.issuer(), "https://sso.example.com/realms/clickmenos");
        assert_eq!(config.client_id(), "backoffice");
        assert_eq!(config.response_type(), "code");
        assert_eq!(config.scopes(), vec!["openid", "profile", "email", "roles"]);
        assert!(config.require_https());
        assert!(!config.show_debug_information());
        assert!(config.silent_refresh());
        assert_eq!(config.token_timeout(), Duration::from_secs(20));
        assert!(config.silent_refresh_redirect_uri().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_allows_customization() {
        let config = AuthConfig::builder(
            "http://localhost:8080/realms/clickmenos".to_string(),
            "backoffice".to_string(),
            "http://localhost:4200/".to_string(),
            "http://localhost:4200/".to_string(),
        )
        .require_https(false)
        .show_debug_information(true)
        .silent_refresh(false)
        .timeout_seconds(5)
        .silent_refresh_redirect_uri("http://localhost:4200/silent-refresh.html".to_string())
        .add_scope("offline_access")
        .build();

        assert!(!config.require_https());
        assert!(config.show_debug_information());
        assert!(!config.silent_refresh());
        assert_eq!(config.token_timeout(), Duration::from_secs(5));
        assert!(config.scopes().contains(&"offline_access"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_add_scope_does_not_duplicate() {
        let config = AuthConfig::builder(
            "https://sso.example.com/realms/clickmenos".to_string(),
            "backoffice".to_string(),
            "https://admin.example.com/".to_string(),
            "https://admin.example.com/".to_string(),
        )
        .add_scope("roles")
        .build();

        let roles_count = config.scopes().iter().filter(|s| **s == "roles").count();
        assert_eq!(roles_count, 1);
    }

    #[test]
    fn validate_rejects_http_issuer_when_https_required() {
        let config = AuthConfig::new(
            "http://sso.example.com/realms/clickmenos".to_string(),
            "backoffice".to_string(),
            "https://admin.example.com/".to_string(),
            "https://admin.example.com/".to_string(),
        );

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AuthenticationError::Configuration { .. }));
        assert!(err.to_string().contains("https"));
    }

    #[test]
    fn validate_rejects_implicit_flow() {
        let json = r#"{
            "issuer": "https://sso.example.com/realms/clickmenos",
            "client_id": "backoffice",
            "redirect_uri": "https://admin.example.com/",
            "post_logout_redirect_uri": "https://admin.example.com/",
            "response_type": "id_token token"
        }"#;
        let config: AuthConfig = serde_json::from_str(json).expect("deserialize");

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_redirect() {
        let config = AuthConfig::new(
            "https://sso.example.com/realms/clickmenos".to_string(),
            "backoffice".to_string(),
            "not a url".to_string(),
            "https://admin.example.com/".to_string(),
        );

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redirect_uri"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "issuer": "https://sso.example.com/realms/clickmenos",
            "client_id": "backoffice",
            "redirect_uri": "https://admin.example.com/",
            "post_logout_redirect_uri": "https://admin.example.com/auth/login"
        }"#;

        let config: AuthConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config, AuthConfig {
            post_logout_redirect_uri: "https://admin.example.com/auth/login".to_string(),
            ..test_config()
        });
    }
}
