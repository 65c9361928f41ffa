//! Short-lived credential signing and verification.

pub mod codec;

pub use codec::{CredentialSigner, JwtCodec, JwtError, SessionClaims, SigningAlgorithm, SigningKey};
