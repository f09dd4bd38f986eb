//! Subscribing sockets.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::debug;
use zeromq::prelude::*;
use zeromq::SubSocket;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::messages::Message;

use super::options::SubscriberOptions;
use super::{authenticate_client, frames_to_message};

/// Subscriber connected to a broadcast backend.
///
/// Subscribes to every type tag in its registry; topic matching is prefix
/// matching on the tag frame.
pub struct Subscriber {
    #[allow(dead_code)]
    context: Arc<Context>,
    socket: Option<SubSocket>,
    options: Option<SubscriberOptions>,
}

impl Subscriber {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            socket: None,
            options: None,
        }
    }

    pub async fn initialize(&mut self, options: SubscriberOptions) -> Result<()> {
        options.validate()?;
        self.disconnect().await;
        authenticate_client(&options.zap, "subscriber").await?;
        let mut socket = SubSocket::new();
        socket.connect(&options.address).await?;
        for type_tag in options.registry.type_tags() {
            socket.subscribe(&type_tag).await?;
        }
        debug!(address = %options.address, "subscriber connected");
        self.socket = Some(socket);
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.socket.is_some()
    }

    /// Receives one message, waiting at most the configured timeout.
    ///
    /// `Ok(None)` signals a timeout; an unregistered tag yields
    /// [`Error::UnknownType`] without disturbing later messages.
    pub async fn receive(&mut self) -> Result<Option<Box<dyn Message>>> {
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("subscriber"))?;
        let socket = self
            .socket
            .as_mut()
            .ok_or(Error::NotInitialized("subscriber"))?;
        let frames = match options.receive_timeout {
            None => socket.recv().await?,
            Some(wait) => match timeout(wait, socket.recv()).await {
                Err(_) => return Ok(None),
                Ok(result) => result?,
            },
        };
        frames_to_message(&options.registry, &frames).map(Some)
    }

    pub async fn disconnect(&mut self) {
        self.socket = None;
        self.options = None;
    }
}

/// Proxy-facing subscriber.
///
/// Faces a broadcast proxy backend and forwards everything downstream, so
/// it has no user-level subscription surface; it subscribes to all
/// topics.
pub struct XSubscriber {
    #[allow(dead_code)]
    context: Arc<Context>,
    socket: Option<SubSocket>,
    options: Option<SubscriberOptions>,
}

impl XSubscriber {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            socket: None,
            options: None,
        }
    }

    pub async fn initialize(&mut self, options: SubscriberOptions) -> Result<()> {
        options.validate()?;
        self.disconnect().await;
        authenticate_client(&options.zap, "xsubscriber").await?;
        let mut socket = SubSocket::new();
        socket.connect(&options.address).await?;
        socket.subscribe("").await?;
        debug!(address = %options.address, "xsubscriber connected");
        self.socket = Some(socket);
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.socket.is_some()
    }

    pub async fn receive(&mut self) -> Result<Option<Box<dyn Message>>> {
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("xsubscriber"))?;
        let socket = self
            .socket
            .as_mut()
            .ok_or(Error::NotInitialized("xsubscriber"))?;
        let frames = match options.receive_timeout {
            None => socket.recv().await?,
            Some(wait) => match timeout(wait, socket.recv()).await {
                Err(_) => return Ok(None),
                Ok(result) => result?,
            },
        };
        frames_to_message(&options.registry, &frames).map(Some)
    }

    pub async fn disconnect(&mut self) {
        self.socket = None;
        self.options = None;
    }
}
