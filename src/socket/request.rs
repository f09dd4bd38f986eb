//! Client end of the request/reply pattern.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, warn};
use zeromq::prelude::*;
use zeromq::ReqSocket;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::messages::Message;

use super::options::RequestOptions;
use super::{authenticate_client, frames_to_message, message_to_frames};

/// Strictly alternating request/reply client.
///
/// A timed-out round trip yields `Ok(None)` and quietly recreates the
/// socket, since the underlying REQ state machine cannot be reused after
/// an abandoned request.
pub struct Request {
    #[allow(dead_code)]
    context: Arc<Context>,
    socket: Option<ReqSocket>,
    options: Option<RequestOptions>,
}

impl Request {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            socket: None,
            options: None,
        }
    }

    pub async fn initialize(&mut self, options: RequestOptions) -> Result<()> {
        options.validate()?;
        self.disconnect().await;
        authenticate_client(&options.zap, "request").await?;
        let mut socket = ReqSocket::new();
        socket.connect(&options.address).await?;
        debug!(address = %options.address, "request socket connected");
        self.socket = Some(socket);
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.socket.is_some()
    }

    /// Sends `message` and waits for the reply.
    pub async fn request(&mut self, message: &dyn Message) -> Result<Option<Box<dyn Message>>> {
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("request"))?
            .clone();
        let socket = self
            .socket
            .as_mut()
            .ok_or(Error::NotInitialized("request"))?;
        let frames = message_to_frames(message)?;
        socket.send(frames).await?;
        let reply = match options.timeout {
            None => socket.recv().await?,
            Some(wait) => match timeout(wait, socket.recv()).await {
                Err(_) => {
                    warn!(
                        address = %options.address,
                        "request timed out; recreating socket"
                    );
                    self.reconnect().await?;
                    return Ok(None);
                }
                Ok(result) => result?,
            },
        };
        frames_to_message(&options.registry, &reply).map(Some)
    }

    async fn reconnect(&mut self) -> Result<()> {
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("request"))?;
        let mut socket = ReqSocket::new();
        socket.connect(&options.address).await?;
        self.socket = Some(socket);
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.socket = None;
        self.options = None;
    }
}
