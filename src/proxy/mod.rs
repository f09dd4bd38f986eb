//! Broker proxies.
//!
//! Each proxy is a long-lived steerable forwarder between a bound
//! frontend and a bound backend. Proxies are initialized once, started
//! once, and stopped through their control channel; re-initialization
//! after stop is permitted.

mod broadcast;
mod router_dealer;

pub use broadcast::BroadcastProxy;
pub use router_dealer::RouterDealerProxy;

use crate::authentication::ZapOptions;
use crate::error::{Error, Result};

/// Addresses and security posture of a proxy.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Where the message producers (publishers, request clients) connect.
    pub frontend_address: String,
    /// Where the consumers (subscribers, repliers) connect.
    pub backend_address: String,
    pub zap: ZapOptions,
}

impl ProxyOptions {
    pub fn new(frontend_address: impl Into<String>, backend_address: impl Into<String>) -> Self {
        Self {
            frontend_address: frontend_address.into(),
            backend_address: backend_address.into(),
            zap: ZapOptions::default(),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.frontend_address.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "proxy frontend address is empty".to_string(),
            ));
        }
        if self.backend_address.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "proxy backend address is empty".to_string(),
            ));
        }
        if self.frontend_address == self.backend_address {
            return Err(Error::InvalidArgument(
                "proxy frontend and backend addresses must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_addresses_are_rejected() {
        let options = ProxyOptions::new("tcp://127.0.0.1:5", "tcp://127.0.0.1:5");
        assert!(options.validate().is_err());
        let options = ProxyOptions::new("tcp://127.0.0.1:5", "tcp://127.0.0.1:6");
        assert!(options.validate().is_ok());
    }
}
