//! In-memory fakes for the provider and navigator seams.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clickmenos_core::Result;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use url::Url;

use crate::error::AuthenticationError;
use crate::oidc::AuthConfig;
use crate::provider::{IdentityProvider, ProviderEvent, TokenValidity};
use crate::redirect::Navigator;

pub(crate) const END_SESSION: &str =
    "https://sso.example.com/realms/clickmenos/protocol/openid-connect/logout";

pub(crate) fn test_config() -> AuthConfig {
    AuthConfig::builder(
        "https://sso.example.com/realms/clickmenos".to_string(),
        "backoffice".to_string(),
        "https://admin.example.com/".to_string(),
        "https://admin.example.com/".to_string(),
    )
    .silent_refresh(false)
    .build()
}

/// Builds an unsigned compact JWT carrying `claims`.
pub(crate) fn id_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{body}.signature")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    Succeed,
    Fail,
    Hang,
}

/// Identity provider whose token state is set directly by the test.
pub(crate) struct FakeProvider {
    valid: AtomicBool,
    discovery_fails: AtomicBool,
    id_token: Mutex<Option<String>>,
    validity: Mutex<Option<TokenValidity>>,
    end_session: Mutex<Option<Url>>,
    refresh_outcome: Mutex<RefreshOutcome>,
    events: broadcast::Sender<ProviderEvent>,
    pub(crate) configure_calls: AtomicUsize,
    pub(crate) init_code_flow_calls: AtomicUsize,
    pub(crate) log_out_calls: AtomicUsize,
    pub(crate) silent_refresh_calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            valid: AtomicBool::new(false),
            discovery_fails: AtomicBool::new(false),
            id_token: Mutex::new(None),
            validity: Mutex::new(None),
            end_session: Mutex::new(None),
            refresh_outcome: Mutex::new(RefreshOutcome::Succeed),
            events,
            configure_calls: AtomicUsize::new(0),
            init_code_flow_calls: AtomicUsize::new(0),
            log_out_calls: AtomicUsize::new(0),
            silent_refresh_calls: AtomicUsize::new(0),
        }
    }

    /// A provider holding a valid token with the given ID token claims.
    pub(crate) fn signed_in(claims: &Value) -> Self {
        let provider = Self::new();
        provider.valid.store(true, Ordering::SeqCst);
        *provider.id_token.lock().unwrap() = Some(id_token(claims));
        provider
    }

    pub(crate) fn with_end_session(self) -> Self {
        *self.end_session.lock().unwrap() = Some(Url::parse(END_SESSION).unwrap());
        self
    }

    pub(crate) fn with_validity(self, validity: TokenValidity) -> Self {
        *self.validity.lock().unwrap() = Some(validity);
        self
    }

    pub(crate) fn with_refresh_outcome(self, outcome: RefreshOutcome) -> Self {
        *self.refresh_outcome.lock().unwrap() = outcome;
        self
    }

    pub(crate) fn failing_discovery(self) -> Self {
        self.discovery_fails.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn configure(&self, _config: &AuthConfig) -> Result<(), AuthenticationError> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_discovery_document(&self) -> Result<(), AuthenticationError> {
        if self.discovery_fails.load(Ordering::SeqCst) {
            return Err(AuthenticationError::Discovery {
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn load_discovery_and_try_login(
        &self,
        _callback: Option<&Url>,
    ) -> Result<(), AuthenticationError> {
        self.load_discovery_document().await
    }

    fn has_valid_access_token(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn access_token(&self) -> Option<String> {
        self.has_valid_access_token()
            .then(|| "access-token".to_string())
    }

    fn access_token_validity(&self) -> Option<TokenValidity> {
        *self.validity.lock().unwrap()
    }

    fn id_token(&self) -> Option<String> {
        self.id_token.lock().unwrap().clone()
    }

    fn end_session_endpoint(&self) -> Option<Url> {
        self.end_session.lock().unwrap().clone()
    }

    async fn init_code_flow(&self) -> Result<Url, AuthenticationError> {
        self.init_code_flow_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Url::parse(
            "https://sso.example.com/realms/clickmenos/protocol/openid-connect/auth?response_type=code",
        )
        .unwrap())
    }

    async fn log_out(&self) {
        self.log_out_calls.fetch_add(1, Ordering::SeqCst);
        self.valid.store(false, Ordering::SeqCst);
        *self.id_token.lock().unwrap() = None;
        *self.validity.lock().unwrap() = None;
        self.emit(ProviderEvent::Logout);
    }

    async fn silent_refresh(&self) -> Result<(), AuthenticationError> {
        self.silent_refresh_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = *self.refresh_outcome.lock().unwrap();
        match outcome {
            RefreshOutcome::Succeed => {
                self.valid.store(true, Ordering::SeqCst);
                self.emit(ProviderEvent::TokenRefreshed);
                Ok(())
            }
            RefreshOutcome::Fail => {
                self.emit(ProviderEvent::TokenRefreshError {
                    reason: "network unreachable".to_string(),
                });
                Err(AuthenticationError::RefreshFailed {
                    reason: "network unreachable".to_string(),
                }
                .into())
            }
            RefreshOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

/// Navigator that records every navigation.
pub(crate) struct RecordingNavigator {
    current: Mutex<String>,
    routes: Mutex<Vec<String>>,
    redirects: Mutex<Vec<Url>>,
    route_tx: mpsc::UnboundedSender<String>,
    route_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl RecordingNavigator {
    pub(crate) fn at(route: &str) -> Self {
        let (route_tx, route_rx) = mpsc::unbounded_channel();
        Self {
            current: Mutex::new(route.to_string()),
            routes: Mutex::new(Vec::new()),
            redirects: Mutex::new(Vec::new()),
            route_tx,
            route_rx: tokio::sync::Mutex::new(route_rx),
        }
    }

    pub(crate) fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }

    pub(crate) fn redirects(&self) -> Vec<Url> {
        self.redirects.lock().unwrap().clone()
    }

    /// Waits for the next in-app navigation.
    pub(crate) async fn next_route(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.route_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    fn navigate(&self, route: &str) {
        *self.current.lock().unwrap() = route.to_string();
        self.routes.lock().unwrap().push(route.to_string());
        let _ = self.route_tx.send(route.to_string());
    }

    fn redirect_browser(&self, url: &Url) {
        self.redirects.lock().unwrap().push(url.clone());
    }
}
