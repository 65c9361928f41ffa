//! # tandem-client
//!
//! Client side of tandem session authentication.
//!
//! - [`agent::SessionAgent`] keeps the short-lived credential fresh, with one
//!   refresh in flight at a time and a hard logout when the session is lost
//! - [`transport::HttpTransport`] talks to the session endpoints
//! - [`credentials`] persists the session between runs

pub mod agent;
pub mod config;
pub mod credentials;
pub mod error;
pub mod transport;

pub use agent::{AgentEvent, AgentStatus, SessionAgent};
pub use config::AgentConfig;
pub use credentials::{FileTokenStore, MemoryTokenStore, StoredSession, TokenStore};
pub use error::{ClientError, ReauthReason};
pub use transport::{HeaderNames, HttpTransport, Refreshed, SessionTransport};
