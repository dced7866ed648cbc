//! OIDC identity provider implementation using the openidconnect crate.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickmenos_core::Result;
use clickmenos_platform_access::{
    AuthConfig, AuthenticationError, ClaimValues, IdentityClaims, IdentityProvider, ProviderEvent,
    TokenValidity,
};
use openidconnect::core::{
    CoreAuthDisplay, CoreAuthenticationFlow, CoreClaimName, CoreClaimType, CoreClient,
    CoreClientAuthMethod, CoreGrantType, CoreJsonWebKey, CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm, CoreResponseMode, CoreResponseType, CoreSubjectIdentifierType,
};
use openidconnect::{
    AdditionalProviderMetadata, AuthorizationCode, ClientId, CsrfToken, EndSessionUrl, IssuerUrl,
    Nonce, OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier, ProviderMetadata,
    RedirectUrl, RefreshToken, Scope, TokenResponse,
};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::store::{PendingAuthorization, PersistedState, TokenSet, TokenStore};

/// Discovery metadata extended with the RP-initiated logout endpoint.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogoutProviderMetadata {
    end_session_endpoint: Option<EndSessionUrl>,
}

impl AdditionalProviderMetadata for LogoutProviderMetadata {}

/// Provider metadata as discovered from `/.well-known/openid-configuration`.
pub type DiscoveredMetadata = ProviderMetadata<
    LogoutProviderMetadata,
    CoreAuthDisplay,
    CoreClientAuthMethod,
    CoreClaimName,
    CoreClaimType,
    CoreGrantType,
    CoreJweContentEncryptionAlgorithm,
    CoreJweKeyManagementAlgorithm,
    CoreJsonWebKey,
    CoreResponseMode,
    CoreResponseType,
    CoreSubjectIdentifierType,
>;

/// Parameters the provider appended to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallbackParams {
    Code {
        code: String,
        state: Option<String>,
    },
    Error {
        error: String,
        description: Option<String>,
    },
}

/// Extracts the authorization response from a callback URL.
///
/// An `error` parameter wins over a `code`. Returns `None` when the URL
/// carries neither.
fn parse_callback(url: &Url) -> Option<CallbackParams> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(CallbackParams::Error { error, description });
    }
    code.map(|code| CallbackParams::Code { code, state })
}

/// Builds a [`TokenSet`] from a token endpoint response.
///
/// Refresh responses may omit the refresh and ID tokens; those are carried
/// over from `previous`.
fn token_set<TR>(
    response: &TR,
    now: DateTime<Utc>,
    previous: Option<&TokenSet>,
) -> Result<TokenSet, AuthenticationError>
where
    TR: OAuth2TokenResponse + Serialize,
{
    // The raw id_token is only reachable through the serialized response.
    let response_json = serde_json::to_value(response).map_err(|e| {
        AuthenticationError::InvalidToken {
            reason: format!("failed to serialize token response: {e}"),
        }
    })?;
    let id_token = response_json
        .get("id_token")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    // A lifetime past chrono's range is as good as no expiry.
    let expires_at = response
        .expires_in()
        .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
        .and_then(|lifetime| now.checked_add_signed(lifetime));

    Ok(TokenSet {
        access_token: response.access_token().secret().clone(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
        id_token: id_token.or_else(|| previous.and_then(|p| p.id_token.clone())),
        issued_at: now,
        expires_at,
    })
}

/// Returns true if `client_id` is an audience of the ID token and, when
/// present, its authorized party.
fn issued_to(id_token: &str, client_id: &str) -> bool {
    let Ok(claims) = IdentityClaims::from_id_token(id_token) else {
        return false;
    };
    let audience = claims
        .get_claim("aud")
        .map(ClaimValues::from_value)
        .unwrap_or_default();
    let authorized_party = claims.get_claim("azp").and_then(Value::as_str);

    audience.as_slice().iter().any(|aud| aud == client_id)
        && authorized_party.is_none_or(|azp| azp == client_id)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Identity provider backed by an OpenID Connect issuer.
///
/// Holds the discovered metadata and the current tokens in memory and
/// writes every token change through to a [`TokenStore`].
pub struct OidcProvider {
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    config: RwLock<Option<AuthConfig>>,
    metadata: RwLock<Option<DiscoveredMetadata>>,
    tokens: RwLock<Option<TokenSet>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl OidcProvider {
    /// Creates a provider persisting tokens to `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError::Configuration`] if the HTTP client
    /// cannot be built.
    pub fn new(store: Arc<dyn TokenStore>) -> Result<Self, AuthenticationError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthenticationError::Configuration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        let (events, _) = broadcast::channel(32);

        Ok(Self {
            http,
            store,
            config: RwLock::new(None),
            metadata: RwLock::new(None),
            tokens: RwLock::new(None),
            events,
        })
    }

    fn emit(&self, event: ProviderEvent) {
        if self.events.send(event).is_err() {
            debug!("no listeners for provider event");
        }
    }

    fn verbose(&self) -> bool {
        read(&self.config)
            .as_ref()
            .is_some_and(AuthConfig::show_debug_information)
    }

    fn current_config(&self) -> Result<AuthConfig, AuthenticationError> {
        read(&self.config).clone().ok_or_else(|| {
            AuthenticationError::Configuration {
                reason: "identity provider not configured".to_string(),
            }
            .into()
        })
    }

    fn current_metadata(&self) -> Result<DiscoveredMetadata, AuthenticationError> {
        read(&self.metadata)
            .clone()
            .ok_or_else(|| AuthenticationError::DiscoveryNotLoaded.into())
    }

    fn redirect_url(config: &AuthConfig) -> Result<RedirectUrl, AuthenticationError> {
        RedirectUrl::new(config.redirect_uri().to_string()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid redirect URI: {e}"),
            }
            .into()
        })
    }

    /// Publishes a token error and returns it as a report.
    fn reject(&self, error: AuthenticationError) -> Report<AuthenticationError> {
        warn!(error = %error, "token response rejected");
        self.emit(ProviderEvent::TokenError {
            reason: error.to_string(),
        });
        error.into()
    }

    /// Publishes a refresh error and returns it as a report.
    fn refresh_failed(&self, reason: String) -> Report<AuthenticationError> {
        self.emit(ProviderEvent::TokenRefreshError {
            reason: reason.clone(),
        });
        AuthenticationError::RefreshFailed { reason }.into()
    }

    async fn restore_tokens(&self) -> Result<(), AuthenticationError> {
        let config = self.current_config()?;
        let state = self.store.load().await?;
        match state.tokens {
            Some(tokens)
                if tokens
                    .id_token
                    .as_deref()
                    .is_some_and(|id_token| !issued_to(id_token, config.client_id())) =>
            {
                warn!(
                    client_id = config.client_id(),
                    "stored ID token was not issued to this client; ignoring stored tokens"
                );
            }
            Some(tokens) => {
                if self.verbose() {
                    debug!(
                        expires_at = ?tokens.expires_at,
                        has_refresh_token = tokens.refresh_token.is_some(),
                        "restored stored tokens"
                    );
                }
                *write(&self.tokens) = Some(tokens);
            }
            None => debug!("no stored tokens"),
        }
        Ok(())
    }

    async fn complete_code_flow(&self, params: CallbackParams) -> Result<(), AuthenticationError> {
        let (code, state) = match params {
            CallbackParams::Error { error, description } => {
                if let Some(description) = description {
                    warn!(%error, %description, "authorization response carries an error");
                }
                return Err(self.reject(AuthenticationError::AuthorizationDenied { error }));
            }
            CallbackParams::Code { code, state } => (code, state),
        };

        let persisted = self.store.load().await?;
        let Some(pending) = persisted.pending else {
            return Err(self.reject(AuthenticationError::StateMismatch));
        };
        if state.as_deref() != Some(pending.state.as_str()) {
            return Err(self.reject(AuthenticationError::StateMismatch));
        }

        let config = self.current_config()?;
        let client = CoreClient::from_provider_metadata(
            self.current_metadata()?,
            ClientId::new(config.client_id().to_string()),
            None,
        )
        .set_redirect_uri(Self::redirect_url(&config)?);

        let token_request = client
            .exchange_code(AuthorizationCode::new(code))
            .map_err(|e| {
                self.reject(AuthenticationError::TokenExchange {
                    reason: format!("token endpoint error: {e}"),
                })
            })?;
        let token_response = token_request
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                self.reject(AuthenticationError::TokenExchange {
                    reason: e.to_string(),
                })
            })?;

        let id_token = token_response.id_token().ok_or_else(|| {
            self.reject(AuthenticationError::InvalidToken {
                reason: "no ID token in response".to_string(),
            })
        })?;
        let nonce = Nonce::new(pending.nonce.clone());
        id_token
            .claims(&client.id_token_verifier(), &nonce)
            .map_err(|e| {
                self.reject(AuthenticationError::InvalidToken {
                    reason: format!("ID token validation failed: {e}"),
                })
            })?;

        let tokens = token_set(&token_response, Utc::now(), None)?;
        if self.verbose() {
            debug!(
                expires_at = ?tokens.expires_at,
                has_refresh_token = tokens.refresh_token.is_some(),
                "tokens received"
            );
        }
        *write(&self.tokens) = Some(tokens.clone());

        self.store
            .save(&PersistedState {
                tokens: Some(tokens),
                pending: None,
            })
            .await?;

        info!("authorization code exchanged for tokens");
        self.emit(ProviderEvent::TokenReceived);
        Ok(())
    }

    /// Writes the current tokens, keeping any pending authorization.
    async fn save_tokens(&self) -> Result<(), AuthenticationError> {
        let mut state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "stored token state unreadable; overwriting");
                PersistedState::default()
            }
        };
        state.tokens = read(&self.tokens).clone();
        self.store.save(&state).await
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn configure(&self, config: &AuthConfig) -> Result<(), AuthenticationError> {
        config.validate()?;
        if config.show_debug_information() {
            debug!(
                issuer = config.issuer(),
                client_id = config.client_id(),
                scope = config.scope_raw(),
                "identity provider configured"
            );
        }
        *write(&self.config) = Some(config.clone());
        Ok(())
    }

    async fn load_discovery_document(&self) -> Result<(), AuthenticationError> {
        if read(&self.metadata).is_some() {
            return Ok(());
        }

        let config = self.current_config()?;
        let issuer_url = IssuerUrl::new(config.issuer().to_string()).map_err(|e| {
            AuthenticationError::Configuration {
                reason: format!("invalid issuer URL: {e}"),
            }
        })?;

        match DiscoveredMetadata::discover_async(issuer_url, &self.http).await {
            Ok(metadata) => {
                info!(issuer = config.issuer(), "discovery document loaded");
                *write(&self.metadata) = Some(metadata);
                self.emit(ProviderEvent::DiscoveryDocumentLoaded);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(issuer = config.issuer(), error = %reason, "discovery failed");
                self.emit(ProviderEvent::DiscoveryDocumentLoadError {
                    reason: reason.clone(),
                });
                Err(AuthenticationError::Discovery { reason }.into())
            }
        }
    }

    async fn load_discovery_and_try_login(
        &self,
        callback: Option<&Url>,
    ) -> Result<(), AuthenticationError> {
        self.load_discovery_document().await?;

        match callback.and_then(parse_callback) {
            Some(params) => self.complete_code_flow(params).await,
            None => self.restore_tokens().await,
        }
    }

    fn has_valid_access_token(&self) -> bool {
        read(&self.tokens)
            .as_ref()
            .is_some_and(|tokens| tokens.is_valid_at(Utc::now()))
    }

    fn access_token(&self) -> Option<String> {
        read(&self.tokens)
            .as_ref()
            .filter(|tokens| tokens.is_valid_at(Utc::now()))
            .map(|tokens| tokens.access_token.clone())
    }

    fn access_token_validity(&self) -> Option<TokenValidity> {
        read(&self.tokens).as_ref().and_then(TokenSet::validity)
    }

    fn id_token(&self) -> Option<String> {
        read(&self.tokens)
            .as_ref()
            .and_then(|tokens| tokens.id_token.clone())
    }

    fn end_session_endpoint(&self) -> Option<Url> {
        read(&self.metadata).as_ref().and_then(|metadata| {
            metadata
                .additional_metadata()
                .end_session_endpoint
                .as_ref()
                .map(|endpoint| endpoint.url().clone())
        })
    }

    async fn init_code_flow(&self) -> Result<Url, AuthenticationError> {
        let config = self.current_config()?;
        let client = CoreClient::from_provider_metadata(
            self.current_metadata()?,
            ClientId::new(config.client_id().to_string()),
            None,
        )
        .set_redirect_uri(Self::redirect_url(&config)?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        // "openid" is always requested by the client itself
        for scope in config.scopes().into_iter().filter(|s| *s != "openid") {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        let pending = PendingAuthorization {
            state: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
            nonce: nonce.secret().clone(),
            created_at: Utc::now(),
        };
        let tokens = read(&self.tokens).clone();
        self.store
            .save(&PersistedState {
                tokens,
                pending: Some(pending),
            })
            .await?;

        debug!("authorization request prepared");
        Ok(auth_url)
    }

    async fn log_out(&self) {
        *write(&self.tokens) = None;
        if let Err(e) = self.store.save(&PersistedState::default()).await {
            warn!(error = %e, "failed to clear stored tokens");
        }
        info!("local token state cleared");
        self.emit(ProviderEvent::Logout);
    }

    async fn silent_refresh(&self) -> Result<(), AuthenticationError> {
        let previous = read(&self.tokens).clone();
        let Some(refresh_token) = previous.as_ref().and_then(|t| t.refresh_token.clone()) else {
            return Err(self.refresh_failed("no refresh token available".to_string()));
        };

        let config = self.current_config()?;
        let metadata = self
            .current_metadata()
            .map_err(|e| self.refresh_failed(e.to_string()))?;
        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(config.client_id().to_string()),
            None,
        )
        .set_redirect_uri(Self::redirect_url(&config)?);

        let refresh_token = RefreshToken::new(refresh_token);
        let token_request = client
            .exchange_refresh_token(&refresh_token)
            .map_err(|e| self.refresh_failed(format!("token endpoint error: {e}")))?;
        let token_response = token_request
            .request_async(&self.http)
            .await
            .map_err(|e| self.refresh_failed(e.to_string()))?;

        // Refreshed ID tokens do not echo the login nonce.
        if let Some(id_token) = token_response.id_token() {
            id_token
                .claims(
                    &client.id_token_verifier(),
                    |_: Option<&Nonce>| -> std::result::Result<(), String> { Ok(()) },
                )
                .map_err(|e| self.refresh_failed(format!("ID token validation failed: {e}")))?;
        }

        let tokens = token_set(&token_response, Utc::now(), previous.as_ref())?;
        if self.verbose() {
            debug!(expires_at = ?tokens.expires_at, "tokens refreshed");
        }
        *write(&self.tokens) = Some(tokens);

        if let Err(e) = self.save_tokens().await {
            warn!(error = %e, "failed to persist refreshed tokens");
        }
        self.emit(ProviderEvent::TokenRefreshed);
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
