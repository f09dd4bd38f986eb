//! Server end of the request/reply pattern.
//!
//! A router owns a bound socket and a steerable poll loop. Every inbound
//! request is split into its identity envelope and its `(type_tag,
//! payload)` frames; the callback produces the reply, and the envelope is
//! echoed back so the transport can route it to the requesting client.
//! Callback errors (and panics) become `Failure` replies; they never kill
//! the loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};
use zeromq::prelude::*;
use zeromq::{RouterSocket, ZmqMessage};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::messages::{Failure, Message};

use super::options::{RouterCallback, RouterOptions};
use super::{Command, JOIN_GRACE};

/// Bound router running a callback-driven service loop.
pub struct Router {
    context: Arc<Context>,
    socket: Option<RouterSocket>,
    options: Option<RouterOptions>,
    control: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Router {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            socket: None,
            options: None,
            control: None,
            task: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Validates the options and binds the socket.
    pub async fn initialize(&mut self, options: RouterOptions) -> Result<()> {
        options.validate()?;
        self.stop().await;
        let mut socket = RouterSocket::new();
        socket.bind(&options.address).await?;
        debug!(address = %options.address, "router bound");
        self.socket = Some(socket);
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.options.is_some()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Launches the service loop.
    pub async fn start(&mut self) -> Result<()> {
        let socket = self.socket.take().ok_or(Error::NotInitialized("router"))?;
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("router"))?;
        let callback = options
            .callback
            .clone()
            .ok_or_else(|| Error::InvalidArgument("router requires a callback".to_string()))?;
        let poll_timeout = options.poll_timeout;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let task = self.context.spawn(serve_loop(
            socket,
            callback,
            poll_timeout,
            running,
            control_rx,
            "router",
        ));
        self.control = Some(control_tx);
        self.task = Some(task);
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(control) = &self.control {
            let _ = control.send(Command::Pause);
        }
    }

    pub fn resume(&self) {
        if let Some(control) = &self.control {
            let _ = control.send(Command::Resume);
        }
    }

    /// Terminates the loop and joins the task. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Command::Terminate);
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if timeout(JOIN_GRACE, task).await.is_err() {
                warn!("router loop did not exit within grace; continuing shutdown");
            }
        }
        self.socket = None;
        self.options = None;
    }
}

/// Shared service loop for routers and proxied repliers.
pub(super) async fn serve_loop<S>(
    mut socket: S,
    callback: RouterCallback,
    poll_timeout: Duration,
    running: Arc<AtomicBool>,
    mut control: mpsc::UnboundedReceiver<Command>,
    what: &'static str,
) where
    S: SocketRecv + SocketSend + Send + 'static,
{
    let mut paused = false;
    while running.load(Ordering::SeqCst) {
        while let Ok(command) = control.try_recv() {
            match command {
                Command::Pause => paused = true,
                Command::Resume => paused = false,
                Command::Terminate => {
                    running.store(false, Ordering::SeqCst);
                }
            }
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }
        if paused {
            sleep(poll_timeout).await;
            continue;
        }
        let request = match timeout(poll_timeout, socket.recv()).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                error!(error = %e, what, "socket failure; stopping loop");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Ok(Ok(message)) => message,
        };
        if let Some(reply) = answer(&callback, &request, what) {
            if let Err(e) = socket.send(reply).await {
                warn!(error = %e, what, "failed to send reply");
            }
        }
    }
    debug!(what, "service loop exited");
}

/// Runs the callback and assembles the reply, echoing the identity
/// envelope of the request.
fn answer(callback: &RouterCallback, request: &ZmqMessage, what: &str) -> Option<ZmqMessage> {
    let frames: Vec<&Bytes> = request.iter().collect();
    if frames.len() < 2 {
        warn!(what, frames = frames.len(), "request too short; dropped");
        return None;
    }
    let envelope = &frames[..frames.len() - 2];
    let type_tag = String::from_utf8_lossy(frames[frames.len() - 2]).into_owned();
    let payload = frames[frames.len() - 1];

    let reply_message: Box<dyn Message> =
        match catch_unwind(AssertUnwindSafe(|| callback(&type_tag, payload))) {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                warn!(what, type_tag = %type_tag, error = %e, "callback failed");
                Box::new(Failure::new(e.to_string()))
            }
            Err(_) => {
                error!(what, type_tag = %type_tag, "callback panicked");
                Box::new(Failure::new("internal service failure"))
            }
        };
    let payload = match reply_message.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            error!(what, error = %e, "reply serialization failed");
            return None;
        }
    };

    let mut reply = match envelope.first() {
        Some(first) => {
            let mut message = ZmqMessage::from((*first).clone());
            for frame in &envelope[1..] {
                message.push_back((*frame).clone());
            }
            message.push_back(Bytes::from(reply_message.type_tag().to_string()));
            message
        }
        None => ZmqMessage::from(Bytes::from(reply_message.type_tag().to_string())),
    };
    reply.push_back(Bytes::from(payload));
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn echo_callback() -> RouterCallback {
        Arc::new(|type_tag, _payload| {
            if type_tag == "boom" {
                panic!("callback exploded");
            }
            Err(Error::UnknownType(type_tag.to_string()))
        })
    }

    #[test]
    fn short_requests_are_dropped() {
        let callback = echo_callback();
        let request = ZmqMessage::from(Bytes::from_static(b"only-one-frame"));
        assert!(answer(&callback, &request, "test").is_none());
    }

    #[test]
    fn callback_errors_become_failure_replies() {
        let callback = echo_callback();
        let mut request = ZmqMessage::from(Bytes::from_static(b"identity"));
        request.push_back(Bytes::from_static(b"Some.Tag"));
        request.push_back(Bytes::from_static(b"payload"));
        let reply = answer(&callback, &request, "test").unwrap();
        let frames: Vec<&Bytes> = reply.iter().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"identity");
        assert_eq!(&frames[1][..], Failure::TYPE_TAG.as_bytes());
    }

    #[test]
    fn callback_panics_become_failure_replies() {
        let callback = echo_callback();
        let mut request = ZmqMessage::from(Bytes::from_static(b"identity"));
        request.push_back(Bytes::from_static(b"boom"));
        request.push_back(Bytes::from_static(b"payload"));
        let reply = answer(&callback, &request, "test").unwrap();
        let frames: Vec<&Bytes> = reply.iter().collect();
        assert_eq!(&frames[1][..], Failure::TYPE_TAG.as_bytes());
    }
}
