//! Proxied replier.
//!
//! A `Reply` is a worker behind the router/dealer proxy: it connects a
//! dealer socket to the proxy backend and runs the same callback-driven
//! service loop as a [`super::Router`], echoing whatever identity
//! envelope the proxy threaded through so replies find their way back to
//! the requesting client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use zeromq::prelude::*;
use zeromq::DealerSocket;

use crate::context::Context;
use crate::error::{Error, Result};

use super::options::ReplyOptions;
use super::router::serve_loop;
use super::{authenticate_client, Command, JOIN_GRACE};

pub struct Reply {
    context: Arc<Context>,
    socket: Option<DealerSocket>,
    options: Option<ReplyOptions>,
    control: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Reply {
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

    /// Authenticates (when configured) and connects to the proxy backend.
    pub async fn initialize(&mut self, options: ReplyOptions) -> Result<()> {
        options.validate()?;
        self.stop().await;
        authenticate_client(&options.zap, "reply").await?;
        let mut socket = DealerSocket::new();
        socket.connect(&options.address).await?;
        debug!(address = %options.address, "replier connected");
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

    pub async fn start(&mut self) -> Result<()> {
        let socket = self.socket.take().ok_or(Error::NotInitialized("reply"))?;
        let options = self
            .options
            .as_ref()
            .ok_or(Error::NotInitialized("reply"))?;
        let callback = options
            .callback
            .clone()
            .ok_or_else(|| Error::InvalidArgument("reply requires a callback".to_string()))?;
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
            "reply",
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
                warn!("reply loop did not exit within grace; continuing shutdown");
            }
        }
        self.socket = None;
        self.options = None;
    }
}
