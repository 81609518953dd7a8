//! One-way credential storage.
//!
//! Passwords are hashed with Argon2id into a PHC string. The plaintext never
//! leaves this module and the hash is never serialized or printed.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use thiserror::Error;

use gatehouse_core::{DomainError, DomainResult};

/// Minimum accepted password length (in characters).
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("stored credential is malformed: {0}")]
    Malformed(String),
}

/// Hashed account secret (Argon2id PHC string).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Reject passwords that do not meet the account password policy.
    pub fn check_policy(password: &str) -> DomainResult<()> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash(password: &str) -> Result<Self, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;
        Ok(Self(phc.to_string()))
    }

    /// Rebuild a credential from its stored PHC string.
    pub fn from_phc(phc: impl Into<String>) -> Result<Self, CredentialError> {
        let phc = phc.into();
        PasswordHash::new(&phc).map_err(|e| CredentialError::Malformed(e.to_string()))?;
        Ok(Self(phc))
    }

    /// Stored representation. Only the persistence layer should need this.
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// Check a plaintext password against this credential.
    pub fn verify(&self, password: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
