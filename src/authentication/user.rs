//! Credential records backing the authenticator.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a user is allowed to do once connected.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum UserPrivileges {
    #[default]
    ReadOnly,
    ReadWrite,
    Administrator,
}

impl UserPrivileges {
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::ReadWrite,
            2 => Self::Administrator,
            _ => Self::ReadOnly,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 1,
            Self::Administrator => 2,
        }
    }
}

/// One row of the credential table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Argon2id PHC string; absent for key-only users.
    pub hashed_password: Option<String>,
    /// 40-character public key; absent for password-only users.
    pub public_key: Option<String>,
    pub privileges: UserPrivileges,
}

impl User {
    /// Hashes a plain-text password with Argon2id and a fresh salt.
    pub fn hash_password(plain_text: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain_text.as_bytes(), &salt)
            .map_err(|e| Error::Fatal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Constant-time verification of a plain-text password.
    #[must_use]
    pub fn verify_password(&self, plain_text: &str) -> bool {
        let Some(stored) = self.hashed_password.as_deref() else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(plain_text.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_accepts_the_right_password() {
        let hash = User::hash_password("correct horse").unwrap();
        let user = User {
            name: "operator".to_string(),
            hashed_password: Some(hash),
            ..User::default()
        };
        assert!(user.verify_password("correct horse"));
        assert!(!user.verify_password("battery staple"));
    }

    #[test]
    fn missing_hash_never_verifies() {
        let user = User::default();
        assert!(!user.verify_password("anything"));
    }

    #[test]
    fn privileges_round_trip_through_integers() {
        for privileges in [
            UserPrivileges::ReadOnly,
            UserPrivileges::ReadWrite,
            UserPrivileges::Administrator,
        ] {
            assert_eq!(UserPrivileges::from_i64(privileges.as_i64()), privileges);
        }
        assert_eq!(UserPrivileges::from_i64(99), UserPrivileges::ReadOnly);
        assert!(UserPrivileges::ReadOnly < UserPrivileges::Administrator);
    }
}
