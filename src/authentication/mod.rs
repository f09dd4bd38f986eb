//! Connection authentication.
//!
//! Two concerns live here: the ZAP-style handshake service that vets every
//! inbound connection, and the pluggable [`Authenticator`] policy behind
//! it. Four security postures are supported, from no checks at all
//! (grasslands) to mutual public-key authentication (stonehouse).

mod authenticator;
mod ip;
mod service;
mod sqlite;
mod user;
mod zap;

pub use authenticator::{Authenticator, AuthVerdict, MemoryAuthenticator};
pub use ip::{ip_matches, is_okay_ip};
pub use service::{perform_handshake, ZapService, ZapServiceOptions};
pub use sqlite::SqliteAuthenticator;
pub use user::{User, UserPrivileges};
pub use zap::{
    Keys, Mechanism, SecurityLevel, StatusCode, ZapOptions, ZapReply, ZapRequest,
    DEFAULT_ZAP_ENDPOINT, ZAP_VERSION,
};
