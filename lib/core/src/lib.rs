//! Core domain types and utilities for the ClickMenos back-office.
//!
//! This crate provides the foundational types and error handling shared by
//! the session core and the console that hosts it.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, TenantId};
