//! Password hashing with Argon2id.
//!
//! A stored credential is one PHC string carrying the algorithm id, the cost
//! parameters (including the iteration count), the salt, and the digest:
//!
//! ```text
//! $argon2id$v=19$m=19456,t=3,p=1$<salt>$<digest>
//! ```
//!
//! Verification never fails: malformed or unknown-algorithm records come back
//! as [`Verification::Malformed`].

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, Version,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use once_cell::sync::Lazy;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Algorithm identifier written into every new record.
pub const ALGORITHM: &str = "argon2id";

/// Memory cost in KiB.
const MEMORY_KIB: u32 = 19_456;

/// Number of passes over memory (the iteration count).
pub const ITERATIONS: u32 = 3;

/// Degree of parallelism.
const PARALLELISM: u32 = 1;

/// Errors that can occur while producing a password record.
#[derive(Debug, Error)]
pub enum PasswordError {
    /// Failed to hash password.
    #[error("failed to hash password: {0}")]
    HashError(String),

    /// Invalid password hash format.
    #[error("invalid password hash format")]
    InvalidHash,

    /// The record was produced by an algorithm this build does not know.
    #[error("unsupported password algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Outcome of checking a plaintext against a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Digest matches.
    Verified,
    /// Record is well formed but the digest does not match.
    Mismatch,
    /// Record could not be parsed or names an unknown algorithm.
    Malformed,
}

impl Verification {
    /// Returns true only for [`Verification::Verified`].
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// A parsed password record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    algorithm: String,
    iterations: u32,
    salt: String,
    digest: String,
    encoded: String,
}

impl PasswordRecord {
    /// Parses an encoded record.
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::InvalidHash` if the string is not a complete
    /// PHC record and `PasswordError::UnknownAlgorithm` for anything but Argon2id.
    pub fn parse(encoded: &str) -> Result<Self, PasswordError> {
        let parsed = PasswordHash::new(encoded).map_err(|_| PasswordError::InvalidHash)?;
        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return Err(PasswordError::UnknownAlgorithm(
                parsed.algorithm.as_str().to_string(),
            ));
        }

        let iterations = parsed
            .params
            .get_decimal("t")
            .ok_or(PasswordError::InvalidHash)?;
        let salt = parsed.salt.ok_or(PasswordError::InvalidHash)?;
        let digest = parsed.hash.ok_or(PasswordError::InvalidHash)?;

        Ok(Self {
            algorithm: parsed.algorithm.as_str().to_string(),
            iterations,
            salt: salt.as_str().to_string(),
            digest: digest.to_string(),
            encoded: encoded.to_string(),
        })
    }

    /// Algorithm identifier, e.g. `argon2id`.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Iteration count the digest was derived with.
    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Salt in PHC base64.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Digest in PHC base64.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The single delimited string that gets persisted.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Consumes the record, returning the persisted form.
    #[must_use]
    pub fn into_encoded(self) -> String {
        self.encoded
    }
}

impl std::fmt::Display for PasswordRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, PARALLELISM, None)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password using Argon2id with a fresh random salt.
///
/// # Errors
///
/// Returns `PasswordError::HashError` if hashing fails.
///
/// # Example
///
/// ```
/// use tally_core::auth::hash_password;
///
/// let record = hash_password("my_secure_password").unwrap();
/// assert!(record.encoded().starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<PasswordRecord, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let encoded = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(e.to_string()))?
        .to_string();

    PasswordRecord::parse(&encoded)
}

/// Verifies a password against an encoded record.
///
/// The digest is recomputed with the record's own salt and parameters and
/// compared in constant time.
///
/// # Example
///
/// ```
/// use tally_core::auth::{hash_password, verify_password, Verification};
///
/// let record = hash_password("my_password").unwrap();
/// assert_eq!(verify_password("my_password", record.encoded()), Verification::Verified);
/// assert_eq!(verify_password("wrong", record.encoded()), Verification::Mismatch);
/// assert_eq!(verify_password("my_password", "plain"), Verification::Malformed);
/// ```
pub fn verify_password(password: &str, encoded: &str) -> Verification {
    // A record missing its salt or digest would otherwise read as a mismatch.
    if PasswordRecord::parse(encoded).is_err() {
        return Verification::Malformed;
    }
    let Ok(parsed) = PasswordHash::new(encoded) else {
        return Verification::Malformed;
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Verification::Verified,
        Err(argon2::password_hash::Error::Password) => Verification::Mismatch,
        Err(_) => Verification::Malformed,
    }
}

/// Compares a candidate against a legacy plaintext in constant time.
#[must_use]
pub fn legacy_password_matches(candidate: &str, stored: &str) -> bool {
    candidate.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Record used to spend one verification when no account matches, so the
/// response time does not reveal whether a username exists.
static DECOY_RECORD: Lazy<Option<PasswordRecord>> =
    Lazy::new(|| hash_password("decoy-password-never-matches").ok());

/// Runs a verification whose result is discarded.
pub fn verify_decoy(password: &str) {
    if let Some(record) = DECOY_RECORD.as_ref() {
        let _ = verify_password(password, record.encoded());
    }
}
