//! Identity provider plumbing for the console.
//!
//! - `oidc`: the [`OidcProvider`], an `IdentityProvider` over the
//!   `openidconnect` crate (discovery, code + PKCE, refresh grant,
//!   RP-initiated logout)
//! - `store`: where tokens and the pending authorization live between runs

pub mod oidc;
pub mod store;

pub use oidc::OidcProvider;
pub use store::{
    FileTokenStore, MemoryTokenStore, PendingAuthorization, PersistedState, TokenSet, TokenStore,
};
