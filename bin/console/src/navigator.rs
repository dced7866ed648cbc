//! Terminal stand-in for the browser router.

use std::sync::{Mutex, PoisonError};

use clickmenos_platform_access::Navigator;
use tracing::info;
use url::Url;

/// Navigator for a shell session.
///
/// In-app routes are tracked in memory; browser redirects are printed for
/// the operator to open.
#[derive(Debug)]
pub struct TerminalNavigator {
    current: Mutex<String>,
}

impl TerminalNavigator {
    /// Creates a navigator positioned at `route`.
    #[must_use]
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(route.into()),
        }
    }
}

impl Navigator for TerminalNavigator {
    fn current_route(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, route: &str) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        info!(from = %current, to = %route, "navigating");
        *current = route.to_string();
    }

    fn redirect_browser(&self, url: &Url) {
        info!(host = url.host_str().unwrap_or_default(), "leaving for the identity provider");
        println!("Open this URL in your browser:\n\n    {url}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickmenos_platform_access::{LOGIN_ROUTE, ROOT_ROUTE};

    #[test]
    fn navigate_moves_current_route() {
        let navigator = TerminalNavigator::new(LOGIN_ROUTE);
        assert_eq!(navigator.current_route(), LOGIN_ROUTE);

        navigator.navigate(ROOT_ROUTE);

        assert_eq!(navigator.current_route(), ROOT_ROUTE);
    }

    #[test]
    fn redirect_keeps_current_route() {
        let navigator = TerminalNavigator::new(ROOT_ROUTE);

        navigator.redirect_browser(&Url::parse("https://sso.example.com/logout").unwrap());

        assert_eq!(navigator.current_route(), ROOT_ROUTE);
    }
}
