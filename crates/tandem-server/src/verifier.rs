//! Password check against the accounts in the configuration.

use std::collections::HashMap;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use async_trait::async_trait;
use tandem_auth::{AuthError, AuthResult, PasswordVerifier, SubjectId};

use crate::config::UserEntry;

struct Account {
    subject_id: SubjectId,
    password_hash: String,
}

/// Verifies usernames and Argon2 password hashes from `[[users]]`.
pub struct ConfiguredUsers {
    accounts: HashMap<String, Account>,
    /// Checked for unknown usernames so they cost as much as known ones.
    decoy_hash: String,
}

impl ConfiguredUsers {
    pub fn new(users: &[UserEntry]) -> AuthResult<Self> {
        let mut accounts = HashMap::with_capacity(users.len());
        for user in users {
            accounts.insert(
                user.username.clone(),
                Account {
                    subject_id: SubjectId::parse(user.subject_id.clone())?,
                    password_hash: user.password_hash.clone(),
                },
            );
        }

        Ok(Self {
            accounts,
            decoy_hash: hash_password("decoy")?,
        })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Hashes a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))
}

fn verify_hash(password: &str, hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::configuration(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[async_trait]
impl PasswordVerifier for ConfiguredUsers {
    async fn verify(&self, username: &str, password: &str) -> AuthResult<Option<SubjectId>> {
        let (hash, subject_id) = match self.accounts.get(username) {
            Some(account) => (account.password_hash.clone(), Some(account.subject_id.clone())),
            None => (self.decoy_hash.clone(), None),
        };
        let password = password.to_string();

        // CPU-bound
        let matched = tokio::task::spawn_blocking(move || verify_hash(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("password check panicked: {e}")))??;

        Ok(subject_id.filter(|_| matched))
    }
}
