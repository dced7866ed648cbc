//! ClickMenos back-office console.
//!
//! This crate wires the platform-access session core to a real OIDC
//! provider, a file-backed token store and a terminal, so that an operator
//! can sign in, inspect the session and sign out from a shell.

pub mod auth;
pub mod config;
pub mod navigator;
