//! Authentication and password hashing.
//!
//! This module provides:
//! - Password records (Argon2id, one encoded string per account)
//! - Password verification with an explicit outcome
//! - Legacy plaintext comparison in constant time
//! - Account roles and the authenticated principal

mod password;

pub use password::{
    ALGORITHM, ITERATIONS, PasswordError, PasswordRecord, Verification, hash_password,
    legacy_password_matches, verify_decoy, verify_password,
};

use serde::{Deserialize, Serialize};
use tally_shared::types::AccountId;
use tally_shared::{AppError, AppResult};

/// Account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, manages accounts.
    Admin,
    /// Manages stock and prices.
    Manager,
    /// Records sales and purchases.
    Staff,
}

impl Role {
    /// Stored form of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Staff => "staff",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" | "administrator" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "staff" | "user" => Ok(Self::Staff),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

/// Identity established by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Account row id.
    pub account_id: AccountId,
    /// Login name.
    pub username: String,
    /// Name shown to other users.
    pub display_name: String,
    /// Role granted to the account.
    pub role: Role,
}

/// Result of a login attempt.
///
/// `Denied` carries no reason: an unknown user, an inactive account and a
/// wrong password are indistinguishable to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted.
    Authenticated(Principal),
    /// Credentials rejected.
    Denied,
}

impl AuthOutcome {
    /// Returns the principal if authenticated.
    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Authenticated(principal) => Some(principal),
            Self::Denied => None,
        }
    }

    /// Returns the principal, or `AppError::Unauthorized` for a denial.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` if the credentials were rejected.
    pub fn require(self) -> AppResult<Principal> {
        match self {
            Self::Authenticated(principal) => Ok(principal),
            Self::Denied => Err(AppError::Unauthorized),
        }
    }
}
