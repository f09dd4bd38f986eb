//! Authentication decision policy.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::ip::{ip_matches, is_okay_ip};
use super::user::UserPrivileges;
use super::zap::StatusCode;
use crate::error::{Error, Result};

/// Outcome of a credential check: a ZAP status code plus loggable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVerdict {
    pub status_code: StatusCode,
    pub status_text: String,
}

impl AuthVerdict {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status_code: StatusCode::Ok,
            status_text: "OK".to_string(),
        }
    }

    #[must_use]
    pub fn client_error(status_text: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::ClientError,
            status_text: status_text.into(),
        }
    }

    #[must_use]
    pub fn server_error(status_text: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::ServerError,
            status_text: status_text.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status_code == StatusCode::Ok
    }
}

/// Decision policy consulted by the handshake service.
///
/// Implementations must be thread-safe; credential validation may block on
/// a table read, which is why the methods are async.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// True when `address` matches the blacklist.
    async fn is_blacklisted(&self, address: &str) -> bool;

    /// True when `address` matches the whitelist.
    async fn is_whitelisted(&self, address: &str) -> bool;

    /// Checks a username/password pair.
    async fn validate_credentials(&self, username: &str, password: &str) -> AuthVerdict;

    /// Checks a client public key.
    async fn validate_public_key(&self, public_key: &str) -> AuthVerdict;

    /// Least privilege granted to an authenticated user.
    fn minimum_user_privileges(&self) -> UserPrivileges {
        UserPrivileges::ReadOnly
    }

    /// Adds an address to the whitelist; removes it from the blacklist
    /// when present.
    async fn allow(&self, address: &str) -> Result<()> {
        let _ = address;
        Err(Error::InvalidArgument(
            "this authenticator has no mutable whitelist".to_string(),
        ))
    }

    /// Adds an address to the blacklist; removes it from the whitelist
    /// when present.
    async fn deny(&self, address: &str) -> Result<()> {
        let _ = address;
        Err(Error::InvalidArgument(
            "this authenticator has no mutable blacklist".to_string(),
        ))
    }
}

/// In-memory policy for standalone deployments and tests.
///
/// Black/white lists and credentials live in process memory; reads vastly
/// outnumber writes, hence the `RwLock`s.
#[derive(Debug, Default)]
pub struct MemoryAuthenticator {
    blacklist: RwLock<HashSet<String>>,
    whitelist: RwLock<HashSet<String>>,
    /// username -> Argon2id PHC string
    passwords: RwLock<HashMap<String, String>>,
    public_keys: RwLock<HashSet<String>>,
}

impl MemoryAuthenticator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a username with an already-hashed password.
    pub fn add_credential(&self, username: impl Into<String>, hashed_password: impl Into<String>) {
        if let Ok(mut passwords) = self.passwords.write() {
            passwords.insert(username.into(), hashed_password.into());
        }
    }

    pub fn add_public_key(&self, public_key: impl Into<String>) {
        if let Ok(mut keys) = self.public_keys.write() {
            keys.insert(public_key.into());
        }
    }
}

#[async_trait]
impl Authenticator for MemoryAuthenticator {
    async fn is_blacklisted(&self, address: &str) -> bool {
        self.blacklist
            .read()
            .map(|addresses| ip_matches(address, &addresses))
            .unwrap_or(false)
    }

    async fn is_whitelisted(&self, address: &str) -> bool {
        self.whitelist
            .read()
            .map(|addresses| ip_matches(address, &addresses))
            .unwrap_or(false)
    }

    async fn validate_credentials(&self, username: &str, password: &str) -> AuthVerdict {
        let stored = self
            .passwords
            .read()
            .ok()
            .and_then(|passwords| passwords.get(username).cloned());
        match stored {
            Some(hash) => {
                let user = super::User {
                    name: username.to_string(),
                    hashed_password: Some(hash),
                    ..super::User::default()
                };
                if user.verify_password(password) {
                    AuthVerdict::ok()
                } else {
                    AuthVerdict::client_error("invalid password")
                }
            }
            None => AuthVerdict::client_error(format!("unknown user '{username}'")),
        }
    }

    async fn validate_public_key(&self, public_key: &str) -> AuthVerdict {
        let known = self
            .public_keys
            .read()
            .map(|keys| keys.contains(public_key))
            .unwrap_or(false);
        if known {
            AuthVerdict::ok()
        } else {
            AuthVerdict::client_error("unknown public key")
        }
    }

    async fn allow(&self, address: &str) -> Result<()> {
        if !is_okay_ip(address) {
            return Err(Error::InvalidArgument(format!(
                "'{address}' is not a valid address pattern"
            )));
        }
        if let Ok(mut blacklist) = self.blacklist.write() {
            blacklist.remove(address);
        }
        if let Ok(mut whitelist) = self.whitelist.write() {
            whitelist.insert(address.to_string());
        }
        Ok(())
    }

    async fn deny(&self, address: &str) -> Result<()> {
        if !is_okay_ip(address) {
            return Err(Error::InvalidArgument(format!(
                "'{address}' is not a valid address pattern"
            )));
        }
        if let Ok(mut whitelist) = self.whitelist.write() {
            whitelist.remove(address);
        }
        if let Ok(mut blacklist) = self.blacklist.write() {
            blacklist.insert(address.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::User;

    #[tokio::test]
    async fn deny_then_allow_moves_an_address_between_lists() {
        let auth = MemoryAuthenticator::new();
        auth.deny("127.0.0.1").await.unwrap();
        assert!(auth.is_blacklisted("127.0.0.1").await);
        auth.allow("127.0.0.1").await.unwrap();
        assert!(!auth.is_blacklisted("127.0.0.1").await);
        assert!(auth.is_whitelisted("127.0.0.1").await);
    }

    #[tokio::test]
    async fn wildcard_blacklisting_blocks_the_subnet() {
        let auth = MemoryAuthenticator::new();
        auth.deny("10.0.*").await.unwrap();
        assert!(auth.is_blacklisted("10.0.3.4").await);
        assert!(!auth.is_blacklisted("10.1.3.4").await);
        assert!(auth.deny("*").await.is_err());
    }

    #[tokio::test]
    async fn credential_checks_yield_verdicts() {
        let auth = MemoryAuthenticator::new();
        auth.add_credential("operator", User::hash_password("s3cret").unwrap());
        assert!(auth.validate_credentials("operator", "s3cret").await.is_ok());
        let wrong = auth.validate_credentials("operator", "nope").await;
        assert_eq!(wrong.status_code, StatusCode::ClientError);
        let unknown = auth.validate_credentials("ghost", "nope").await;
        assert_eq!(unknown.status_code, StatusCode::ClientError);
    }
}
