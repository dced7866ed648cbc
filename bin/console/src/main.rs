use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clickmenos_console::auth::{FileTokenStore, OidcProvider};
use clickmenos_console::config::ConsoleConfig;
use clickmenos_console::navigator::TerminalNavigator;
use clickmenos_platform_access::{AuthService, LOGIN_ROUTE, ROOT_ROUTE, RedirectController};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Sign in to the ClickMenos back-office from a terminal.
#[derive(Debug, Parser)]
#[command(name = "clickmenos", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a login, or finish one with the URL the browser was sent back to.
    Login {
        /// Full redirect URL including `code` and `state`.
        callback_url: Option<Url>,
    },
    /// Show the current session.
    Status,
    /// Keep the session alive, refreshing tokens until interrupted.
    Watch,
    /// End the session locally and at the identity provider.
    Logout,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(token_file = %config.token_file.display(), "Loaded configuration");

    let store = Arc::new(FileTokenStore::new(config.token_file));
    let provider = match OidcProvider::new(store) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            tracing::error!(error = %e, "failed to create identity provider");
            return ExitCode::FAILURE;
        }
    };

    let start_route = match cli.command {
        Command::Login { .. } => LOGIN_ROUTE,
        _ => ROOT_ROUTE,
    };
    let navigator = Arc::new(TerminalNavigator::new(start_route));
    let auth = AuthService::new(config.auth, provider, navigator.clone());
    auth.configure();
    let redirects = RedirectController::new(navigator).spawn(auth.session());

    let code = match cli.command {
        Command::Login { callback_url } => login(&auth, callback_url.as_ref()).await,
        Command::Status => {
            auth.bootstrap(None).await;
            print_status(&auth);
            ExitCode::SUCCESS
        }
        Command::Watch => watch(&auth).await,
        Command::Logout => {
            auth.bootstrap(None).await;
            auth.logout().await;
            println!("Signed out.");
            ExitCode::SUCCESS
        }
    };

    redirects.abort();
    code
}

async fn login(auth: &AuthService, callback_url: Option<&Url>) -> ExitCode {
    auth.bootstrap(callback_url).await;

    if auth.is_authenticated() {
        print_status(auth);
        return ExitCode::SUCCESS;
    }

    if callback_url.is_some() {
        eprintln!("Login failed; see the log for details.");
        return ExitCode::FAILURE;
    }

    auth.login().await;
    println!("Then run: clickmenos login '<url the browser was redirected to>'");
    ExitCode::SUCCESS
}

async fn watch(auth: &AuthService) -> ExitCode {
    auth.bootstrap(None).await;
    print_status(auth);
    if !auth.is_authenticated() {
        return ExitCode::FAILURE;
    }

    let mut authenticated = auth.session().subscribe_authenticated();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return ExitCode::SUCCESS;
            }
            changed = authenticated.changed() => {
                if changed.is_err() {
                    return ExitCode::FAILURE;
                }
                let now = *authenticated.borrow_and_update();
                tracing::info!(authenticated = now, "session changed");
                if !now {
                    print_status(auth);
                    return ExitCode::FAILURE;
                }
            }
        }
    }
}

fn print_status(auth: &AuthService) {
    println!("session: {:?}", auth.session().phase());
    if !auth.is_authenticated() {
        return;
    }

    let claims = auth.identity_claims().unwrap_or_default();
    let user = claims
        .preferred_username
        .or(claims.sub)
        .unwrap_or_else(|| "-".to_string());
    let tenant = auth
        .tenant_id()
        .map_or_else(|| "-".to_string(), |tenant| tenant.to_string());
    let roles = auth.roles();

    println!("user:    {user}");
    println!("tenant:  {tenant}");
    println!("roles:   {}", roles.as_slice().join(", "));
}
