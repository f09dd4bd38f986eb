//! Publishing sockets.
//!
//! A [`Publisher`] connects to a broadcast proxy frontend; an
//! [`XPublisher`] binds and is what a proxy (or a standalone broadcast)
//! exposes. After a successful bind the XPublisher sleeps briefly so that
//! already-connecting subscribers do not miss the first messages.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::debug;
use zeromq::prelude::*;
use zeromq::PubSocket;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::messages::Message;

use super::options::PublisherOptions;
use super::{authenticate_client, message_to_frames, SLOW_JOINER_SLEEP};

async fn send_on(
    socket: &mut PubSocket,
    options: &PublisherOptions,
    message: &dyn Message,
) -> Result<()> {
    let frames = message_to_frames(message)?;
    match options.send_timeout {
        None => socket.send(frames).await?,
        Some(wait) => timeout(wait, socket.send(frames))
            .await
            .map_err(|_| {
                Error::Backpressure(format!(
                    "send on {} did not complete within {wait:?}",
                    options.address
                ))
            })??,
    }
    Ok(())
}

/// Connecting publisher.
pub struct Publisher {
    #[allow(dead_code)]
    context: Arc<Context>,
    socket: Option<PubSocket>,
    options: Option<PublisherOptions>,
}

impl Publisher {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            socket: None,
            options: None,
        }
    }

    /// Authenticates (when configured) and connects the socket.
    pub async fn initialize(&mut self, options: PublisherOptions) -> Result<()> {
        options.validate()?;
        self.disconnect().await;
        authenticate_client(&options.zap, "publisher").await?;
        let mut socket = PubSocket::new();
        socket.connect(&options.address).await?;
        debug!(address = %options.address, "publisher connected");
        self.socket = Some(socket);
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.socket.is_some()
    }

    /// Sends one message as two frames.
    pub async fn send(&mut self, message: &dyn Message) -> Result<()> {
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("publisher"))?;
        let socket = self
            .socket
            .as_mut()
            .ok_or(Error::NotInitialized("publisher"))?;
        send_on(socket, options, message).await
    }

    /// Releases the endpoint and clears the socket details.
    pub async fn disconnect(&mut self) {
        self.socket = None;
        self.options = None;
    }
}

/// Binding publisher, the broadcast-facing side of a proxy.
pub struct XPublisher {
    #[allow(dead_code)]
    context: Arc<Context>,
    socket: Option<PubSocket>,
    options: Option<PublisherOptions>,
}

impl XPublisher {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            socket: None,
            options: None,
        }
    }

    /// Binds the socket, then waits out the slow-joiner window.
    pub async fn initialize(&mut self, options: PublisherOptions) -> Result<()> {
        options.validate()?;
        self.disconnect().await;
        let mut socket = PubSocket::new();
        socket.bind(&options.address).await?;
        debug!(address = %options.address, "xpublisher bound");
        sleep(SLOW_JOINER_SLEEP).await;
        self.socket = Some(socket);
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.socket.is_some()
    }

    pub async fn send(&mut self, message: &dyn Message) -> Result<()> {
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("xpublisher"))?;
        let socket = self
            .socket
            .as_mut()
            .ok_or(Error::NotInitialized("xpublisher"))?;
        send_on(socket, options, message).await
    }

    pub async fn disconnect(&mut self) {
        self.socket = None;
        self.options = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Failure;

    #[tokio::test]
    async fn send_before_initialize_is_an_error() {
        let context = Arc::new(Context::current());
        let mut publisher = Publisher::new(context);
        let outcome = publisher.send(&Failure::new("x")).await;
        assert!(matches!(outcome, Err(Error::NotInitialized(_))));
    }

    #[tokio::test]
    async fn empty_address_is_rejected() {
        let context = Arc::new(Context::current());
        let mut publisher = Publisher::new(context);
        let outcome = publisher.initialize(PublisherOptions::new("")).await;
        assert!(matches!(outcome, Err(Error::InvalidArgument(_))));
    }
}
