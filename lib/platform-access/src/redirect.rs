//! Navigation decisions driven by session transitions.
//!
//! Two kinds of navigation exist: in-app route changes, and full browser
//! redirects that leave the application (identity provider login and
//! logout). The [`Navigator`] trait exposes both so the decisions here can
//! be tested without a browser.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::session::{SessionSnapshot, SessionState};

/// Route of the login screen.
pub const LOGIN_ROUTE: &str = "/auth/login";

/// Application root.
pub const ROOT_ROUTE: &str = "/";

/// Host-side navigation primitives.
pub trait Navigator: Send + Sync {
    /// Returns the current in-app route.
    fn current_route(&self) -> String;

    /// Navigates to an in-app route.
    fn navigate(&self, route: &str);

    /// Sends the browser to an external URL, leaving the application.
    fn redirect_browser(&self, url: &Url);
}

/// Where the user goes after a logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutNavigation {
    /// RP-initiated logout at the identity provider.
    Browser(Url),
    /// Local navigation to the login screen.
    InApp(String),
}

/// Decides the logout navigation.
///
/// With both an end-session endpoint and an ID token the browser goes to
/// `<endpoint>?post_logout_redirect_uri=<uri>&id_token_hint=<token>`, values
/// percent-encoded. Otherwise the user is routed to the login screen.
#[must_use]
pub fn logout_navigation(
    end_session_endpoint: Option<&Url>,
    id_token: Option<&str>,
    post_logout_redirect_uri: &str,
) -> LogoutNavigation {
    match (end_session_endpoint, id_token.filter(|t| !t.is_empty())) {
        (Some(endpoint), Some(id_token)) => {
            let mut url = endpoint.clone();
            url.query_pairs_mut()
                .append_pair("post_logout_redirect_uri", post_logout_redirect_uri)
                .append_pair("id_token_hint", id_token);
            LogoutNavigation::Browser(url)
        }
        _ => LogoutNavigation::InApp(LOGIN_ROUTE.to_string()),
    }
}

/// Moves an authenticated user off the login screen.
///
/// Holds no state of its own; it only reacts to published transitions.
#[derive(Clone)]
pub struct RedirectController {
    navigator: Arc<dyn Navigator>,
    login_route: String,
    home_route: String,
}

impl RedirectController {
    /// Creates a controller using [`LOGIN_ROUTE`] and [`ROOT_ROUTE`].
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            login_route: LOGIN_ROUTE.to_string(),
            home_route: ROOT_ROUTE.to_string(),
        }
    }

    /// Overrides the login and home routes.
    #[must_use]
    pub fn with_routes(
        mut self,
        login_route: impl Into<String>,
        home_route: impl Into<String>,
    ) -> Self {
        self.login_route = login_route.into();
        self.home_route = home_route.into();
        self
    }

    /// Applies one transition. Returns true if it navigated.
    pub fn on_transition(&self, snapshot: SessionSnapshot) -> bool {
        if !(snapshot.bootstrapped && snapshot.authenticated) {
            return false;
        }

        let current = self.navigator.current_route();
        if current != self.login_route {
            debug!(route = %current, "authenticated outside the login route");
            return false;
        }

        info!(to = %self.home_route, "authenticated on the login route, redirecting");
        self.navigator.navigate(&self.home_route);
        true
    }

    /// Reacts to every transition published by `session` once bootstrap
    /// has settled. The task ends when the session is dropped.
    pub fn spawn(&self, session: &SessionState) -> JoinHandle<()> {
        let controller = self.clone();
        let mut bootstrapped = session.subscribe_bootstrapped();
        let mut authenticated = session.subscribe_authenticated();

        tokio::spawn(async move {
            if bootstrapped.wait_for(|done| *done).await.is_err() {
                return;
            }
            loop {
                let snapshot = SessionSnapshot {
                    authenticated: *authenticated.borrow_and_update(),
                    bootstrapped: true,
                };
                controller.on_transition(snapshot);
                if authenticated.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNavigator;
    use std::time::Duration;

    const ENDPOINT: &str =
        "https://sso.example.com/realms/clickmenos/protocol/openid-connect/logout";

    fn snapshot(bootstrapped: bool, authenticated: bool) -> SessionSnapshot {
        SessionSnapshot {
            authenticated,
            bootstrapped,
        }
    }

    #[test]
    fn logout_url_with_endpoint_and_token() {
        let endpoint = Url::parse(ENDPOINT).unwrap();
        let navigation = logout_navigation(
            Some(&endpoint),
            Some("eyJhbGciOi.eyJzdWIiOi.c2ln"),
            "https://admin.example.com/",
        );

        let expected = format!(
            "{ENDPOINT}?post_logout_redirect_uri=https%3A%2F%2Fadmin.example.com%2F\
             &id_token_hint=eyJhbGciOi.eyJzdWIiOi.c2ln"
        );
        assert_eq!(navigation, LogoutNavigation::Browser(Url::parse(&expected).unwrap()));
        match navigation {
            LogoutNavigation::Browser(url) => assert_eq!(url.as_str(), expected),
            LogoutNavigation::InApp(_) => panic!("expected browser navigation"),
        }
    }

    #[test]
    fn logout_without_endpoint_routes_to_login() {
        let navigation = logout_navigation(None, Some("token"), "https://admin.example.com/");
        assert_eq!(navigation, LogoutNavigation::InApp(LOGIN_ROUTE.to_string()));
    }

    #[test]
    fn logout_without_id_token_routes_to_login() {
        let endpoint = Url::parse(ENDPOINT).unwrap();
        assert_eq!(
            logout_navigation(Some(&endpoint), None, "https://admin.example.com/"),
            LogoutNavigation::InApp(LOGIN_ROUTE.to_string())
        );
        assert_eq!(
            logout_navigation(Some(&endpoint), Some(""), "https://admin.example.com/"),
            LogoutNavigation::InApp(LOGIN_ROUTE.to_string())
        );
    }

    #[test]
    fn authenticated_on_login_route_goes_home() {
        let navigator = Arc::new(RecordingNavigator::at(LOGIN_ROUTE));
        let controller = RedirectController::new(navigator.clone());

        assert!(controller.on_transition(snapshot(true, true)));
        assert_eq!(navigator.routes(), vec![ROOT_ROUTE.to_string()]);
    }

    #[test]
    fn unauthenticated_on_login_route_stays() {
        let navigator = Arc::new(RecordingNavigator::at(LOGIN_ROUTE));
        let controller = RedirectController::new(navigator.clone());

        assert!(!controller.on_transition(snapshot(true, false)));
        assert!(navigator.routes().is_empty());
    }

    #[test]
    fn nothing_happens_before_bootstrap() {
        let navigator = Arc::new(RecordingNavigator::at(LOGIN_ROUTE));
        let controller = RedirectController::new(navigator.clone());

        assert!(!controller.on_transition(snapshot(false, true)));
        assert!(navigator.routes().is_empty());
    }

    #[test]
    fn authenticated_elsewhere_stays() {
        let navigator = Arc::new(RecordingNavigator::at("/usuarios"));
        let controller = RedirectController::new(navigator.clone());

        assert!(!controller.on_transition(snapshot(true, true)));
        assert!(navigator.routes().is_empty());
    }

    #[test]
    fn custom_routes() {
        let navigator = Arc::new(RecordingNavigator::at("/entrar"));
        let controller =
            RedirectController::new(navigator.clone()).with_routes("/entrar", "/painel");

        assert!(controller.on_transition(snapshot(true, true)));
        assert_eq!(navigator.routes(), vec!["/painel".to_string()]);
    }

    #[tokio::test]
    async fn spawned_controller_reacts_to_login_after_bootstrap() {
        let navigator = Arc::new(RecordingNavigator::at(LOGIN_ROUTE));
        let session = SessionState::new();
        let handle = RedirectController::new(navigator.clone()).spawn(&session);

        session.mark_bootstrapped();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(navigator.routes().is_empty());

        session.set_authenticated(true);
        let route = navigator.next_route(Duration::from_secs(1)).await;
        assert_eq!(route.as_deref(), Some(ROOT_ROUTE));

        handle.abort();
    }
}
