//! Redis-backed credential store for `tandem-auth`.
//!
//! Every session-service instance pointed at the same Redis shares one view
//! of live sessions. Compare-and-swap runs as a Lua script so each key is
//! updated atomically on the server.
//!
//! ```ignore
//! let store = RedisCredentialStore::connect(&RedisConfig::default()).await?;
//! let service = SessionService::from_config(auth_config, Arc::new(store))?;
//! ```

mod config;
mod error;
mod store;

pub use config::RedisConfig;
pub use error::StoreError;
pub use store::RedisCredentialStore;
