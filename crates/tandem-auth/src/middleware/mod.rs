//! HTTP middleware for session authentication.
//!
//! This module provides Axum extractors for:
//!
//! - Short-lived credential extraction and validation ([`SessionAuth`])
//! - Optional authentication on public routes ([`OptionalSessionAuth`])
//! - Administrator checks ([`AdminAuth`])
//! - Claimed device metadata ([`RequestDevice`])
//!
//! and the JSON error responses every rejection renders as.

pub mod admin;
pub mod auth;
pub mod error;
pub mod types;

pub use admin::AdminAuth;
pub use auth::{AuthState, OptionalSessionAuth, SessionAuth};
pub use error::{ErrorBody, status_code};
pub use types::RequestDevice;
