//! Authentication service: the session lifecycle over an identity provider.
//!
//! `AuthService` owns the [`SessionState`] and drives an
//! [`IdentityProvider`] through configure, bootstrap, login, logout and
//! silent refresh. Feature modules only consume its read side:
//! `is_authenticated`, the tokens, the tenant and the roles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clickmenos_core::TenantId;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::claims::IdentityClaims;
use crate::error::{AuthenticationError, AuthorizationError};
use crate::oidc::AuthConfig;
use crate::provider::{IdentityProvider, TokenValidity};
use crate::redirect::{LogoutNavigation, Navigator, logout_navigation};
use crate::role::{Role, RoleSet};
use crate::session::SessionState;

/// Lower bound between two automatic refreshes.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// Session lifecycle and claims access for the back-office.
///
/// Cheap to clone; clones share the same session and provider.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<Inner>,
}

struct Inner {
    config: AuthConfig,
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    session: SessionState,
    configured: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        if let Some(timer) = lock(&self.refresh_timer).take() {
            timer.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Time to wait before the next automatic refresh.
fn refresh_delay(validity: TokenValidity, factor: f64, now: DateTime<Utc>) -> Duration {
    (validity.refresh_at(factor) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(MIN_REFRESH_DELAY)
}

impl AuthService {
    /// Creates a service with a fresh, unbootstrapped session.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                provider,
                navigator,
                session: SessionState::new(),
                configured: AtomicBool::new(false),
                listener: Mutex::new(None),
                refresh_timer: Mutex::new(None),
            }),
        }
    }

    /// Returns the observable session state.
    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.inner.session
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    /// Configures the provider and starts following its token events.
    ///
    /// Only the first call has an effect. Events are observed only when
    /// called from within a Tokio runtime.
    pub fn configure(&self) {
        if self.inner.configured.swap(true, Ordering::SeqCst) {
            debug!("auth service already configured");
            return;
        }

        if let Err(e) = self.inner.provider.configure(&self.inner.config) {
            error!(error = %e, "identity provider rejected the configuration");
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("configured outside a Tokio runtime; provider events are not observed");
            return;
        };

        let mut events = self.inner.provider.events();
        let session = self.inner.session.clone();
        let verbose = self.inner.config.show_debug_information();
        let listener = runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if verbose {
                            debug!(?event, "identity provider event");
                        }
                        if let Some(authenticated) = event.implied_authentication() {
                            session.set_authenticated(authenticated);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "provider events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        *lock(&self.inner.listener) = Some(listener);
    }

    /// Loads discovery, resumes a pending code flow from `callback`, and
    /// checks the stored token.
    ///
    /// Never fails: errors are logged and leave the session unauthenticated.
    /// The bootstrapped flag is published once this settles.
    pub async fn bootstrap(&self, callback: Option<&Url>) {
        let provider = &self.inner.provider;
        let session = &self.inner.session;

        match provider.load_discovery_and_try_login(callback).await {
            Ok(()) => {
                let valid = provider.has_valid_access_token();
                session.set_authenticated(valid);
                if valid {
                    info!("session restored from a valid access token");
                    if self.inner.config.silent_refresh() {
                        self.arm_silent_refresh();
                    }
                } else {
                    info!("no valid access token; session is unauthenticated");
                }
            }
            Err(e) => {
                warn!(error = %e, "bootstrap failed; continuing unauthenticated");
                session.set_authenticated(false);
            }
        }

        if !session.mark_bootstrapped() {
            debug!("bootstrap repeated; session was already bootstrapped");
        }
    }

    /// Sends the browser to the identity provider to log in.
    ///
    /// Failures are logged; there is nothing to return since control
    /// leaves the application on success.
    pub async fn login(&self) {
        let provider = &self.inner.provider;

        if let Err(e) = provider.load_discovery_document().await {
            warn!(error = %e, "cannot start login without the discovery document");
            return;
        }

        match provider.init_code_flow().await {
            Ok(url) => {
                info!("redirecting to the identity provider for login");
                self.inner.navigator.redirect_browser(&url);
            }
            Err(e) => warn!(error = %e, "failed to start the authorization code flow"),
        }
    }

    /// Clears the session and leaves through the provider's logout endpoint,
    /// or routes to the login screen when that is not possible.
    pub async fn logout(&self) {
        if let Some(timer) = lock(&self.inner.refresh_timer).take() {
            timer.abort();
        }
        self.end_session().await;
    }

    /// Renews tokens silently. On failure the session is logged out.
    ///
    /// Returns true if the refresh succeeded.
    pub async fn refresh_token(&self) -> bool {
        self.refresh_or_logout(false).await
    }

    async fn refresh_or_logout(&self, from_timer: bool) -> bool {
        let timeout = self.inner.config.token_timeout();
        let outcome: clickmenos_core::Result<(), AuthenticationError> =
            match tokio::time::timeout(timeout, self.inner.provider.silent_refresh()).await {
                Ok(result) => result,
                Err(_) => Err(AuthenticationError::RefreshTimedOut {
                    seconds: timeout.as_secs(),
                }
                .into()),
            };

        match outcome {
            Ok(()) => {
                debug!("silent refresh succeeded");
                true
            }
            Err(e) => {
                warn!(error = %e, "silent refresh failed; logging out");
                let timer = lock(&self.inner.refresh_timer).take();
                // The timer calls in from its own task, which must not abort itself.
                if let Some(timer) = timer.filter(|_| !from_timer) {
                    timer.abort();
                }
                self.end_session().await;
                false
            }
        }
    }

    async fn end_session(&self) {
        let provider = &self.inner.provider;
        let id_token = provider.id_token();
        let end_session_endpoint = provider.end_session_endpoint();

        provider.log_out().await;
        self.inner.session.set_authenticated(false);

        match logout_navigation(
            end_session_endpoint.as_ref(),
            id_token.as_deref(),
            self.inner.config.post_logout_redirect_uri(),
        ) {
            LogoutNavigation::Browser(url) => {
                info!("redirecting to the identity provider logout endpoint");
                self.inner.navigator.redirect_browser(&url);
            }
            LogoutNavigation::InApp(route) => {
                info!(%route, "no logout endpoint or ID token; routing to login");
                self.inner.navigator.navigate(&route);
            }
        }
    }

    fn arm_silent_refresh(&self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("no Tokio runtime; automatic silent refresh disabled");
            return;
        };

        let service: Weak<Inner> = Arc::downgrade(&self.inner);
        let factor = self.inner.config.timeout_factor();
        let timer = runtime.spawn(async move {
            loop {
                let delay = {
                    let Some(inner) = service.upgrade() else { break };
                    let Some(validity) = inner.provider.access_token_validity() else {
                        debug!("access token has no expiry; silent refresh timer stopped");
                        break;
                    };
                    refresh_delay(validity, factor, Utc::now())
                };
                debug!(delay_secs = delay.as_secs(), "silent refresh scheduled");
                tokio::time::sleep(delay).await;

                let Some(inner) = service.upgrade() else { break };
                if !(AuthService { inner }).refresh_or_logout(true).await {
                    break;
                }
            }
        });

        if let Some(previous) = lock(&self.inner.refresh_timer).replace(timer) {
            previous.abort();
        }
    }

    /// Returns true if a valid token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    /// Returns the access token to attach to API calls.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.inner.provider.access_token()
    }

    /// Returns the raw ID token.
    #[must_use]
    pub fn id_token(&self) -> Option<String> {
        self.inner.provider.id_token()
    }

    /// Returns the claims of the current ID token.
    #[must_use]
    pub fn identity_claims(&self) -> Option<IdentityClaims> {
        self.inner.provider.identity_claims()
    }

    /// Returns the tenant of the current user, if the token carries one.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        let claims = self.identity_claims()?;
        let tenant = claims.tenant_id();
        if tenant.is_none() {
            warn!(sub = ?claims.sub, "identity claims carry no empresa group");
        }
        tenant
    }

    /// Returns the roles of the current user.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        let Some(claims) = self.identity_claims() else {
            return RoleSet::none();
        };
        let roles = claims.roles();
        if roles.is_empty() {
            warn!(sub = ?claims.sub, "identity claims carry no roles");
        }
        roles
    }

    /// Returns true if `role` is exactly one of the user's roles.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().has_role(role)
    }

    /// Returns true if the user is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles().is_admin()
    }

    /// Returns true if the user is a sales manager.
    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.roles().is_manager()
    }

    /// Returns true if the user is a salesperson.
    #[must_use]
    pub fn is_salesperson(&self) -> bool {
        self.roles().is_salesperson()
    }

    /// Checks that the session is authenticated and holds `role`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::NotAuthenticated`] without a valid
    /// session, or [`AuthorizationError::MissingRole`] when neither alias
    /// of `role` is granted.
    pub fn require_role(&self, role: Role) -> Result<(), AuthorizationError> {
        if !self.is_authenticated() {
            return Err(AuthorizationError::NotAuthenticated);
        }
        if !self.roles().has(role) {
            return Err(AuthorizationError::MissingRole {
                role: role.aliases()[0].to_string(),
            });
        }
        Ok(())
    }

    /// Checks that the session is authenticated and scoped to a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::NotAuthenticated`] without a valid
    /// session, or [`AuthorizationError::MissingTenant`] when the token
    /// carries no `empresa_<uuid>` group.
    pub fn require_tenant(&self) -> Result<TenantId, AuthorizationError> {
        if !self.is_authenticated() {
            return Err(AuthorizationError::NotAuthenticated);
        }
        self.tenant_id().ok_or(AuthorizationError::MissingTenant)
    }
}
