//! Domain types shared across the session modules.
//!
//! ## Identity
//!
//! - [`SubjectId`], [`DeviceClass`], [`DeviceFingerprint`] - validated newtypes
//! - [`SessionKey`] - the (subject, device class) partition key
//!
//! ## Credentials
//!
//! - [`ShortLivedCredential`] - signed, self-contained, mirrored in the store
//! - [`LongLivedCredential`] - opaque random value, stored as a digest

pub mod credential;
pub mod session;

pub use credential::{
    IssuedSession, LlcDigest, LongLivedCredential, RefreshedCredential, ShortLivedCredential,
    ValidatedSession,
};
pub use session::{
    DeviceClass, DeviceFingerprint, RefreshRecord, SessionIndex, SessionKey, SessionSummary,
    SubjectId,
};
