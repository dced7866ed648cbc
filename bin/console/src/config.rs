//! Centralized console configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys:
//!
//! ```text
//! AUTH__ISSUER=https://sso.example.com/realms/clickmenos
//! AUTH__CLIENT_ID=backoffice
//! AUTH__REDIRECT_URI=https://admin.example.com/
//! AUTH__POST_LOGOUT_REDIRECT_URI=https://admin.example.com/
//! TOKEN_FILE=/home/me/.clickmenos/session.json
//! ```
//!
//! See [`AuthConfig`] for the optional OIDC settings.

use std::path::PathBuf;

use clickmenos_platform_access::AuthConfig;
use serde::Deserialize;

/// Console configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ConsoleConfig {
    /// OIDC authentication configuration.
    pub auth: AuthConfig,

    /// Where tokens and the pending login are kept between runs.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

fn default_token_file() -> PathBuf {
    PathBuf::from(".clickmenos-session.json")
}

impl ConsoleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Loads configuration from `vars` in place of the process environment.
    fn load(vars: Option<config::Map<String, String>>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("AUTH__ISSUER", "https://sso.example.com/realms/clickmenos"),
        ("AUTH__CLIENT_ID", "backoffice"),
        ("AUTH__REDIRECT_URI", "https://admin.example.com/"),
        ("AUTH__POST_LOGOUT_REDIRECT_URI", "https://admin.example.com/"),
    ];

    #[test]
    fn loads_required_settings_with_defaults() {
        let config = ConsoleConfig::load(vars(REQUIRED)).unwrap();

        assert_eq!(config.auth.issuer(), "https://sso.example.com/realms/clickmenos");
        assert_eq!(config.auth.client_id(), "backoffice");
        assert_eq!(config.auth.scopes(), vec!["openid", "profile", "email", "roles"]);
        assert!(config.auth.require_https());
        assert!(config.auth.silent_refresh());
        assert_eq!(config.token_file, default_token_file());
        assert!(config.auth.validate().is_ok());
    }

    #[test]
    fn parses_optional_settings() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("AUTH__REQUIRE_HTTPS", "false"),
            ("AUTH__SHOW_DEBUG_INFORMATION", "true"),
            ("AUTH__TIMEOUT_SECONDS", "5"),
            ("TOKEN_FILE", "/tmp/session.json"),
        ]);

        let config = ConsoleConfig::load(vars(&pairs)).unwrap();

        assert!(!config.auth.require_https());
        assert!(config.auth.show_debug_information());
        assert_eq!(config.auth.token_timeout().as_secs(), 5);
        assert_eq!(config.token_file, PathBuf::from("/tmp/session.json"));
    }

    #[test]
    fn missing_issuer_is_an_error() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "AUTH__ISSUER")
            .collect();

        assert!(ConsoleConfig::load(vars(&pairs)).is_err());
    }
}
