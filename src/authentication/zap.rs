//! ZAP handshake wire types and per-socket authentication options.
//!
//! Frame order follows RFC 27 (ZAP v1.0). The handshake rides a plain
//! request/reply socket pair on a well-known endpoint; see the module
//! documentation of [`super::service`] for how that differs from the
//! libzmq-internal `inproc://zeromq.zap.01` arrangement.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zeromq::ZmqMessage;

use crate::error::{Error, Result};

/// Protocol version carried in every ZAP frame set.
pub const ZAP_VERSION: &str = "1.0";

/// Where the handshake service listens unless configured otherwise.
pub const DEFAULT_ZAP_ENDPOINT: &str = "ipc:///tmp/seismq-zap.ipc";

/// Security posture of a socket, strictly increasing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SecurityLevel {
    /// No checks.
    #[default]
    Grasslands,
    /// IP checked against the black/white lists.
    Strawhouse,
    /// IP plus username/password.
    Woodhouse,
    /// IP plus public-key exchange.
    Stonehouse,
}

impl SecurityLevel {
    /// Parses the configuration spellings (name or numeric level).
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "0" | "grasslands" => Ok(Self::Grasslands),
            "1" | "strawhouse" => Ok(Self::Strawhouse),
            "2" | "woodhouse" => Ok(Self::Woodhouse),
            "3" | "stonehouse" => Ok(Self::Stonehouse),
            other => Err(Error::InvalidArgument(format!(
                "unknown security level '{other}'"
            ))),
        }
    }
}

/// A curve key pair; the private half is absent on the verifying side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keys {
    pub public_key: String,
    pub private_key: Option<String>,
}

/// Authentication material applied to a socket at initialize.
///
/// This is a value type: sockets copy it, so later mutation of the source
/// has no effect on a live socket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZapOptions {
    pub security_level: SecurityLevel,
    /// ZAP domain; empty means "global".
    pub domain: String,
    /// Servers answer handshakes; clients issue them.
    pub is_server: bool,
    pub server_public_key: Option<String>,
    pub client_keys: Option<Keys>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Endpoint of the handshake service a client should consult; `None`
    /// disables the explicit handshake.
    pub handshake_endpoint: Option<String>,
}

impl ZapOptions {
    #[must_use]
    pub fn grasslands() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn strawhouse_client(endpoint: impl Into<String>) -> Self {
        Self {
            security_level: SecurityLevel::Strawhouse,
            handshake_endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn woodhouse_client(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            security_level: SecurityLevel::Woodhouse,
            username: Some(username.into()),
            password: Some(password.into()),
            handshake_endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stonehouse_client(endpoint: impl Into<String>, keys: Keys) -> Self {
        Self {
            security_level: SecurityLevel::Stonehouse,
            client_keys: Some(keys),
            handshake_endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// The domain, defaulting to `global`.
    #[must_use]
    pub fn domain_or_default(&self) -> &str {
        if self.domain.is_empty() {
            "global"
        } else {
            &self.domain
        }
    }

    /// True when a client-side handshake is required before the socket can
    /// be used.
    #[must_use]
    pub fn requires_handshake(&self) -> bool {
        !self.is_server
            && self.handshake_endpoint.is_some()
            && self.security_level >= SecurityLevel::Woodhouse
    }

    /// Builds the handshake request this client should present.
    pub fn client_request(&self, identity: &str) -> Result<ZapRequest> {
        let mechanism = match self.security_level {
            SecurityLevel::Grasslands | SecurityLevel::Strawhouse => Mechanism::Null,
            SecurityLevel::Woodhouse => Mechanism::Plain,
            SecurityLevel::Stonehouse => Mechanism::Curve,
        };
        let credentials = match mechanism {
            Mechanism::Null => Vec::new(),
            Mechanism::Plain => {
                let username = self.username.clone().ok_or_else(|| {
                    Error::InvalidArgument("woodhouse requires a username".to_string())
                })?;
                let password = self.password.clone().ok_or_else(|| {
                    Error::InvalidArgument("woodhouse requires a password".to_string())
                })?;
                vec![username.into_bytes(), password.into_bytes()]
            }
            Mechanism::Curve => {
                let keys = self.client_keys.as_ref().ok_or_else(|| {
                    Error::InvalidArgument("stonehouse requires client keys".to_string())
                })?;
                vec![keys.public_key.clone().into_bytes()]
            }
        };
        Ok(ZapRequest {
            version: ZAP_VERSION.to_string(),
            request_id: uuid::Uuid::new_v4().to_string().into_bytes(),
            domain: self.domain_or_default().to_string(),
            address: String::new(),
            identity: identity.to_string(),
            mechanism,
            credentials,
        })
    }
}

/// Authentication mechanism named in a handshake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Null,
    Plain,
    Curve,
}

impl Mechanism {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Plain => "PLAIN",
            Self::Curve => "CURVE",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "NULL" => Ok(Self::Null),
            "PLAIN" => Ok(Self::Plain),
            "CURVE" => Ok(Self::Curve),
            other => Err(Error::Decode(format!("unsupported mechanism '{other}'"))),
        }
    }
}

/// Status carried in a ZAP reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200: authenticated.
    Ok,
    /// 400: the client is at fault (bad credentials, blacklisted, ...).
    ClientError,
    /// 500: the server is at fault (store unavailable, internal error).
    ServerError,
}

impl StatusCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "200",
            Self::ClientError => "400",
            Self::ServerError => "500",
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "200" => Ok(Self::Ok),
            "400" => Ok(Self::ClientError),
            "500" => Ok(Self::ServerError),
            other => Err(Error::Decode(format!("unknown status code '{other}'"))),
        }
    }
}

fn frame_string(frames: &[&Bytes], index: usize, what: &str) -> Result<String> {
    frames
        .get(index)
        .map(|frame| String::from_utf8_lossy(frame).into_owned())
        .ok_or_else(|| Error::Decode(format!("handshake frame {index} ({what}) is missing")))
}

/// An inbound handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapRequest {
    pub version: String,
    pub request_id: Vec<u8>,
    pub domain: String,
    /// Originating IP as known to the transport (self-reported here).
    pub address: String,
    /// Identity of the originating socket.
    pub identity: String,
    pub mechanism: Mechanism,
    pub credentials: Vec<Vec<u8>>,
}

impl ZapRequest {
    /// Renders the request as wire frames.
    pub fn to_message(&self) -> Result<ZmqMessage> {
        let mut message = ZmqMessage::from(Bytes::from(self.version.clone()));
        message.push_back(Bytes::from(self.request_id.clone()));
        message.push_back(Bytes::from(self.domain.clone()));
        message.push_back(Bytes::from(self.address.clone()));
        message.push_back(Bytes::from(self.identity.clone()));
        message.push_back(Bytes::from(self.mechanism.as_str().to_string()));
        for credential in &self.credentials {
            message.push_back(Bytes::from(credential.clone()));
        }
        Ok(message)
    }

    /// Parses wire frames in RFC 27 order.
    pub fn from_message(message: &ZmqMessage) -> Result<Self> {
        let frames: Vec<&Bytes> = message.iter().collect();
        if frames.len() < 6 {
            return Err(Error::Decode(format!(
                "handshake request has {} frames; at least 6 required",
                frames.len()
            )));
        }
        let version = frame_string(&frames, 0, "version")?;
        if version != ZAP_VERSION {
            return Err(Error::Decode(format!(
                "unsupported handshake version '{version}'"
            )));
        }
        let mechanism = Mechanism::parse(&frame_string(&frames, 5, "mechanism")?)?;
        Ok(Self {
            version,
            request_id: frames[1].to_vec(),
            domain: frame_string(&frames, 2, "domain")?,
            address: frame_string(&frames, 3, "address")?,
            identity: frame_string(&frames, 4, "identity")?,
            mechanism,
            credentials: frames[6..].iter().map(|frame| frame.to_vec()).collect(),
        })
    }
}

/// The service's answer to a handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapReply {
    pub version: String,
    pub request_id: Vec<u8>,
    pub status_code: StatusCode,
    /// Human-readable; clients log it but never parse it.
    pub status_text: String,
    pub user_id: String,
    pub metadata: Vec<u8>,
}

impl ZapReply {
    #[must_use]
    pub fn new(request_id: Vec<u8>, status_code: StatusCode, status_text: impl Into<String>) -> Self {
        Self {
            version: ZAP_VERSION.to_string(),
            request_id,
            status_code,
            status_text: status_text.into(),
            user_id: String::new(),
            metadata: Vec::new(),
        }
    }

    pub fn to_message(&self) -> Result<ZmqMessage> {
        let mut message = ZmqMessage::from(Bytes::from(self.version.clone()));
        message.push_back(Bytes::from(self.request_id.clone()));
        message.push_back(Bytes::from(self.status_code.as_str().to_string()));
        message.push_back(Bytes::from(self.status_text.clone()));
        message.push_back(Bytes::from(self.user_id.clone()));
        message.push_back(Bytes::from(self.metadata.clone()));
        Ok(message)
    }

    pub fn from_message(message: &ZmqMessage) -> Result<Self> {
        let frames: Vec<&Bytes> = message.iter().collect();
        if frames.len() < 6 {
            return Err(Error::Decode(format!(
                "handshake reply has {} frames; 6 required",
                frames.len()
            )));
        }
        Ok(Self {
            version: frame_string(&frames, 0, "version")?,
            request_id: frames[1].to_vec(),
            status_code: StatusCode::parse(&frame_string(&frames, 2, "status code")?)?,
            status_text: frame_string(&frames, 3, "status text")?,
            user_id: frame_string(&frames, 4, "user id")?,
            metadata: frames[5].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_levels_are_strictly_increasing() {
        assert!(SecurityLevel::Grasslands < SecurityLevel::Strawhouse);
        assert!(SecurityLevel::Strawhouse < SecurityLevel::Woodhouse);
        assert!(SecurityLevel::Woodhouse < SecurityLevel::Stonehouse);
    }

    #[test]
    fn level_parsing_accepts_names_and_numbers() {
        assert_eq!(
            SecurityLevel::parse("stonehouse").unwrap(),
            SecurityLevel::Stonehouse
        );
        assert_eq!(SecurityLevel::parse("1").unwrap(), SecurityLevel::Strawhouse);
        assert!(SecurityLevel::parse("fort-knox").is_err());
    }

    #[test]
    fn request_frames_round_trip() {
        let options = ZapOptions::woodhouse_client("ipc:///tmp/zap-test.ipc", "user", "pw");
        let request = options.client_request("client-7").unwrap();
        let message = request.to_message().unwrap();
        let decoded = ZapRequest::from_message(&message).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.mechanism, Mechanism::Plain);
        assert_eq!(decoded.credentials.len(), 2);
    }

    #[test]
    fn reply_frames_round_trip() {
        let reply = ZapReply::new(b"seq-1".to_vec(), StatusCode::ClientError, "bad password");
        let message = reply.to_message().unwrap();
        let decoded = ZapReply::from_message(&message).unwrap();
        assert_eq!(decoded, reply);
        assert_eq!(decoded.status_code.as_str(), "400");
    }

    #[test]
    fn handshake_is_required_only_above_strawhouse() {
        assert!(!ZapOptions::grasslands().requires_handshake());
        assert!(!ZapOptions::strawhouse_client("ipc:///tmp/x").requires_handshake());
        assert!(ZapOptions::woodhouse_client("ipc:///tmp/x", "u", "p").requires_handshake());
        let mut server = ZapOptions::woodhouse_client("ipc:///tmp/x", "u", "p");
        server.is_server = true;
        assert!(!server.requires_handshake());
    }
}
