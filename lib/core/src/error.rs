//! Shared error plumbing.
//!
//! Crates define their own error enums and return them wrapped in a
//! rootcause [`Report`], which keeps the typed context available to
//! callers (`report.current_context()`) while allowing `.context()` to be
//! layered on as the error travels up.

use rootcause::Report;

/// Result whose error is a [`Report`] over the context type `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
