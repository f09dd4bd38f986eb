//! SQLite-backed authenticator.
//!
//! The schema is small and fixed: a `user` credential table plus
//! `blacklist`/`whitelist` address tables. Address lists are loaded into
//! memory at initialize and kept there (read-mostly; every update writes
//! through to the table and the cache under a write lock). Credential
//! lookups hit the database, which is why validation is async.

use std::collections::HashSet;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{error, warn};

use super::authenticator::{Authenticator, AuthVerdict};
use super::ip::{ip_matches, is_okay_ip};
use super::user::{User, UserPrivileges};
use crate::error::{Error, Result};

const CREATE_USER_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    email TEXT,
    password TEXT,
    public_key CHAR(40) UNIQUE,
    privileges INT NOT NULL DEFAULT 0
);
";

const CREATE_BLACKLIST_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS blacklist ( ip TEXT PRIMARY KEY );
";

const CREATE_WHITELIST_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS whitelist ( ip TEXT PRIMARY KEY );
";

pub struct SqliteAuthenticator {
    pool: Option<SqlitePool>,
    blacklist: RwLock<HashSet<String>>,
    whitelist: RwLock<HashSet<String>>,
    minimum_privileges: UserPrivileges,
}

impl Default for SqliteAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteAuthenticator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: None,
            blacklist: RwLock::new(HashSet::new()),
            whitelist: RwLock::new(HashSet::new()),
            minimum_privileges: UserPrivileges::ReadOnly,
        }
    }

    pub fn set_minimum_user_privileges(&mut self, privileges: UserPrivileges) {
        self.minimum_privileges = privileges;
    }

    /// Opens (optionally creating) the credential database and loads the
    /// address lists.
    pub async fn initialize(&mut self, path: &Path, create_if_missing: bool) -> Result<()> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create_if_missing);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        sqlx::query(CREATE_USER_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_BLACKLIST_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_WHITELIST_TABLE).execute(&pool).await?;

        let blacklist = Self::load_addresses(&pool, "blacklist").await?;
        let whitelist = Self::load_addresses(&pool, "whitelist").await?;
        if let Ok(mut cache) = self.blacklist.write() {
            *cache = blacklist;
        }
        if let Ok(mut cache) = self.whitelist.write() {
            *cache = whitelist;
        }
        self.pool = Some(pool);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    async fn load_addresses(pool: &SqlitePool, table: &str) -> Result<HashSet<String>> {
        let query = format!("SELECT ip FROM {table};");
        let rows = sqlx::query(&query).fetch_all(pool).await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("ip"))
            .collect())
    }

    fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or(Error::NotInitialized("sqlite authenticator"))
    }

    /// Inserts a user; the password, when present, must already be hashed
    /// with [`User::hash_password`].
    pub async fn add_user(&self, user: &User) -> Result<()> {
        if user.name.trim().is_empty() {
            return Err(Error::InvalidArgument("user name is empty".to_string()));
        }
        sqlx::query(
            "INSERT INTO user (name, email, password, public_key, privileges)
             VALUES (?, ?, ?, ?, ?);",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.public_key)
        .bind(user.privileges.as_i64())
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Rewrites an existing user's credentials, keyed by name.
    pub async fn update_user(&self, user: &User) -> Result<()> {
        let outcome = sqlx::query(
            "UPDATE user SET email = ?, password = ?, public_key = ?, privileges = ?
             WHERE name = ?;",
        )
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.public_key)
        .bind(user.privileges.as_i64())
        .bind(&user.name)
        .execute(self.pool()?)
        .await?;
        if outcome.rows_affected() == 0 {
            return Err(Error::InvalidArgument(format!(
                "no user named '{}'",
                user.name
            )));
        }
        Ok(())
    }

    pub async fn delete_user(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM user WHERE name = ?;")
            .bind(name)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    /// All users, without their password hashes.
    pub async fn users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, name, email, public_key, privileges FROM user ORDER BY id;",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows
            .iter()
            .map(|row| User {
                id: row.get("id"),
                name: row.get("name"),
                email: row.get::<Option<String>, _>("email").unwrap_or_default(),
                hashed_password: None,
                public_key: row.get("public_key"),
                privileges: UserPrivileges::from_i64(row.get("privileges")),
            })
            .collect())
    }

    pub async fn add_to_blacklist(&self, address: &str) -> Result<()> {
        if !is_okay_ip(address) {
            return Err(Error::InvalidArgument(format!(
                "'{address}' is not a valid address pattern"
            )));
        }
        if self.is_whitelisted(address).await {
            return Err(Error::InvalidArgument(format!(
                "'{address}' is whitelisted; remove it from the whitelist first"
            )));
        }
        sqlx::query("INSERT OR IGNORE INTO blacklist (ip) VALUES (?);")
            .bind(address)
            .execute(self.pool()?)
            .await?;
        if let Ok(mut cache) = self.blacklist.write() {
            cache.insert(address.to_string());
        }
        Ok(())
    }

    pub async fn remove_from_blacklist(&self, address: &str) -> Result<()> {
        sqlx::query("DELETE FROM blacklist WHERE ip = ?;")
            .bind(address)
            .execute(self.pool()?)
            .await?;
        if let Ok(mut cache) = self.blacklist.write() {
            cache.remove(address);
        }
        Ok(())
    }

    pub async fn add_to_whitelist(&self, address: &str) -> Result<()> {
        if !is_okay_ip(address) {
            return Err(Error::InvalidArgument(format!(
                "'{address}' is not a valid address pattern"
            )));
        }
        if self.is_blacklisted(address).await {
            return Err(Error::InvalidArgument(format!(
                "'{address}' is blacklisted; remove it from the blacklist first"
            )));
        }
        sqlx::query("INSERT OR IGNORE INTO whitelist (ip) VALUES (?);")
            .bind(address)
            .execute(self.pool()?)
            .await?;
        if let Ok(mut cache) = self.whitelist.write() {
            cache.insert(address.to_string());
        }
        Ok(())
    }

    pub async fn remove_from_whitelist(&self, address: &str) -> Result<()> {
        sqlx::query("DELETE FROM whitelist WHERE ip = ?;")
            .bind(address)
            .execute(self.pool()?)
            .await?;
        if let Ok(mut cache) = self.whitelist.write() {
            cache.remove(address);
        }
        Ok(())
    }
}

#[async_trait]
impl Authenticator for SqliteAuthenticator {
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
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(_) => return AuthVerdict::server_error("credential store unavailable"),
        };
        let row = sqlx::query("SELECT password, privileges FROM user WHERE name = ?;")
            .bind(username)
            .fetch_optional(pool)
            .await;
        match row {
            Ok(Some(row)) => {
                let user = User {
                    name: username.to_string(),
                    hashed_password: row.get("password"),
                    privileges: UserPrivileges::from_i64(row.get("privileges")),
                    ..User::default()
                };
                if !user.verify_password(password) {
                    return AuthVerdict::client_error("invalid password");
                }
                if user.privileges < self.minimum_privileges {
                    return AuthVerdict::client_error("insufficient privileges");
                }
                AuthVerdict::ok()
            }
            Ok(None) => AuthVerdict::client_error(format!("unknown user '{username}'")),
            Err(e) => {
                error!(error = %e, "credential lookup failed");
                AuthVerdict::server_error("credential store error")
            }
        }
    }

    async fn validate_public_key(&self, public_key: &str) -> AuthVerdict {
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(_) => return AuthVerdict::server_error("credential store unavailable"),
        };
        let row = sqlx::query("SELECT privileges FROM user WHERE public_key = ?;")
            .bind(public_key)
            .fetch_optional(pool)
            .await;
        match row {
            Ok(Some(row)) => {
                let privileges = UserPrivileges::from_i64(row.get("privileges"));
                if privileges < self.minimum_privileges {
                    return AuthVerdict::client_error("insufficient privileges");
                }
                AuthVerdict::ok()
            }
            Ok(None) => AuthVerdict::client_error("unknown public key"),
            Err(e) => {
                error!(error = %e, "public key lookup failed");
                AuthVerdict::server_error("credential store error")
            }
        }
    }

    fn minimum_user_privileges(&self) -> UserPrivileges {
        self.minimum_privileges
    }

    async fn allow(&self, address: &str) -> Result<()> {
        if self.is_blacklisted(address).await {
            warn!(address, "allow: removing address from blacklist");
            self.remove_from_blacklist(address).await?;
        }
        self.add_to_whitelist(address).await
    }

    async fn deny(&self, address: &str) -> Result<()> {
        if self.is_whitelisted(address).await {
            warn!(address, "deny: removing address from whitelist");
            self.remove_from_whitelist(address).await?;
        }
        self.add_to_blacklist(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authentication::zap::StatusCode;

    async fn fresh() -> (tempfile::TempDir, SqliteAuthenticator) {
        let dir = tempfile::tempdir().unwrap();
        let mut auth = SqliteAuthenticator::new();
        auth.initialize(&dir.path().join("auth.sqlite3"), true)
            .await
            .unwrap();
        (dir, auth)
    }

    #[tokio::test]
    async fn users_round_trip_through_the_table() {
        let (_dir, auth) = fresh().await;
        let user = User {
            name: "operator".to_string(),
            email: "op@observatory.edu".to_string(),
            hashed_password: Some(User::hash_password("s3cret").unwrap()),
            public_key: Some("k".repeat(40)),
            privileges: UserPrivileges::ReadWrite,
            ..User::default()
        };
        auth.add_user(&user).await.unwrap();

        let listed = auth.users().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "operator");
        assert_eq!(listed[0].privileges, UserPrivileges::ReadWrite);

        assert!(auth.validate_credentials("operator", "s3cret").await.is_ok());
        assert_eq!(
            auth.validate_credentials("operator", "wrong")
                .await
                .status_code,
            StatusCode::ClientError
        );
        assert!(auth.validate_public_key(&"k".repeat(40)).await.is_ok());
        assert_eq!(
            auth.validate_public_key("unknown").await.status_code,
            StatusCode::ClientError
        );

        auth.delete_user("operator").await.unwrap();
        assert!(auth.users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn address_lists_write_through_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.sqlite3");
        {
            let mut auth = SqliteAuthenticator::new();
            auth.initialize(&path, true).await.unwrap();
            auth.add_to_blacklist("10.0.*").await.unwrap();
            assert!(auth.is_blacklisted("10.0.1.2").await);
            // A blacklisted address cannot also be whitelisted.
            assert!(auth.add_to_whitelist("10.0.*").await.is_err());
        }
        // A fresh instance sees the persisted list.
        let mut auth = SqliteAuthenticator::new();
        auth.initialize(&path, true).await.unwrap();
        assert!(auth.is_blacklisted("10.0.1.2").await);
        auth.remove_from_blacklist("10.0.*").await.unwrap();
        assert!(!auth.is_blacklisted("10.0.1.2").await);
    }

    #[tokio::test]
    async fn uninitialized_store_reports_server_error() {
        let auth = SqliteAuthenticator::new();
        let verdict = auth.validate_credentials("anyone", "pw").await;
        assert_eq!(verdict.status_code, StatusCode::ServerError);
    }
}
