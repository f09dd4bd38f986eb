//! Options records consumed by the pattern sockets.
//!
//! Options are value types: `initialize` copies them, so mutating the
//! source afterwards has no effect on a live socket. Timeouts follow one
//! convention everywhere: `None` blocks forever, `Some(0)` polls, and a
//! positive duration bounds the wait.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::authentication::ZapOptions;
use crate::error::{Error, Result};
use crate::messages::{Message, MessageRegistry};

use super::DEFAULT_POLL_TIMEOUT;

fn require_address(address: &str, what: &'static str) -> Result<()> {
    if address.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{what} address is empty")));
    }
    Ok(())
}

/// Options for [`super::Publisher`] and [`super::XPublisher`].
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    pub address: String,
    /// Advisory queued-message bound; 0 means unbounded. The embedded
    /// transport bounds its own per-peer queues.
    pub high_water_mark: usize,
    pub send_timeout: Option<Duration>,
    pub zap: ZapOptions,
}

impl PublisherOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            high_water_mark: 0,
            send_timeout: None,
            zap: ZapOptions::default(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_address(&self.address, "publisher")
    }
}

/// Options for [`super::Subscriber`] and [`super::XSubscriber`].
#[derive(Debug, Clone)]
pub struct SubscriberOptions {
    pub address: String,
    pub high_water_mark: usize,
    pub receive_timeout: Option<Duration>,
    pub zap: ZapOptions,
    /// Message formats of interest; the subscriber subscribes to every
    /// registered type tag.
    pub registry: MessageRegistry,
}

impl SubscriberOptions {
    pub fn new(address: impl Into<String>, registry: MessageRegistry) -> Self {
        Self {
            address: address.into(),
            high_water_mark: 0,
            receive_timeout: None,
            zap: ZapOptions::default(),
            registry,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_address(&self.address, "subscriber")?;
        if self.registry.is_empty() {
            return Err(Error::InvalidArgument(
                "subscriber registry has no message types".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options for [`super::Request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub address: String,
    pub high_water_mark: usize,
    /// Bound on each request round trip; `None` blocks forever.
    pub timeout: Option<Duration>,
    pub zap: ZapOptions,
    pub registry: MessageRegistry,
}

impl RequestOptions {
    pub fn new(address: impl Into<String>, registry: MessageRegistry) -> Self {
        Self {
            address: address.into(),
            high_water_mark: 0,
            timeout: Some(Duration::from_secs(5)),
            zap: ZapOptions::default(),
            registry,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_address(&self.address, "request")?;
        if self.registry.is_empty() {
            return Err(Error::InvalidArgument(
                "request registry has no message types".to_string(),
            ));
        }
        Ok(())
    }
}

/// Callback invoked by routers and repliers for every request.
///
/// The callback must be total: it always returns a message, and an `Err`
/// is turned into a `Failure` reply by the poll loop. It must never
/// perform network I/O while holding shared locks.
pub type RouterCallback = Arc<dyn Fn(&str, &[u8]) -> Result<Box<dyn Message>> + Send + Sync>;

/// Options for [`super::Router`].
#[derive(Clone)]
pub struct RouterOptions {
    pub address: String,
    pub high_water_mark: usize,
    pub poll_timeout: Duration,
    pub zap: ZapOptions,
    pub callback: Option<RouterCallback>,
}

impl RouterOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            high_water_mark: 0,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            zap: ZapOptions::default(),
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: RouterCallback) {
        self.callback = Some(callback);
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_address(&self.address, "router")?;
        if self.callback.is_none() {
            return Err(Error::InvalidArgument(
                "router requires a callback".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("address", &self.address)
            .field("poll_timeout", &self.poll_timeout)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Options for [`super::Reply`], a worker connected to a dealer backend.
#[derive(Clone)]
pub struct ReplyOptions {
    /// Backend address of the router/dealer proxy this replier serves.
    pub address: String,
    pub high_water_mark: usize,
    pub poll_timeout: Duration,
    pub zap: ZapOptions,
    pub callback: Option<RouterCallback>,
}

impl ReplyOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            high_water_mark: 0,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            zap: ZapOptions::default(),
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: RouterCallback) {
        self.callback = Some(callback);
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_address(&self.address, "reply")?;
        if self.callback.is_none() {
            return Err(Error::InvalidArgument(
                "reply requires a callback".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ReplyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyOptions")
            .field("address", &self.address)
            .field("poll_timeout", &self.poll_timeout)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
