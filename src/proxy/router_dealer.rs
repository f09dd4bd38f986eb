//! Request (router/dealer) proxy.
//!
//! Clients issue requests at the bound router frontend; repliers connect
//! their dealer sockets to the bound dealer backend, which fair-queues
//! work among them. The transport threads client identity frames through
//! both hops, so replies route back without the proxy inspecting them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::socket::Command;

use super::ProxyOptions;

const POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(10);
const JOIN_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

pub struct RouterDealerProxy {
    context: Arc<Context>,
    options: Option<ProxyOptions>,
    frontend: Option<RouterSocket>,
    backend: Option<DealerSocket>,
    control: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl RouterDealerProxy {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            options: None,
            frontend: None,
            backend: None,
            control: None,
            task: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Binds the router frontend and the dealer backend.
    pub async fn initialize(&mut self, options: ProxyOptions) -> Result<()> {
        options.validate()?;
        self.stop().await;
        let mut frontend = RouterSocket::new();
        frontend.bind(&options.frontend_address).await?;
        let mut backend = DealerSocket::new();
        backend.bind(&options.backend_address).await?;
        debug!(
            frontend = %options.frontend_address,
            backend = %options.backend_address,
            "router/dealer proxy bound"
        );
        self.frontend = Some(frontend);
        self.backend = Some(backend);
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
        let frontend = self
            .frontend
            .take()
            .ok_or(Error::NotInitialized("router/dealer proxy"))?;
        let backend = self
            .backend
            .take()
            .ok_or(Error::NotInitialized("router/dealer proxy"))?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let task = self
            .context
            .spawn(relay_loop(frontend, backend, running, control_rx));
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

    /// Terminates the relay and joins it. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Command::Terminate);
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if timeout(JOIN_GRACE, task).await.is_err() {
                warn!("router/dealer proxy did not exit within grace; continuing shutdown");
            }
        }
        self.frontend = None;
        self.backend = None;
        self.options = None;
    }
}

async fn relay_loop(
    mut frontend: RouterSocket,
    mut backend: DealerSocket,
    running: Arc<AtomicBool>,
    mut control: mpsc::UnboundedReceiver<Command>,
) {
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
            sleep(POLL_TIMEOUT).await;
            continue;
        }
        // Requests: router -> dealer, identity frames intact.
        match timeout(POLL_TIMEOUT, frontend.recv()).await {
            Err(_) => {}
            Ok(Err(e)) => {
                error!(error = %e, "request proxy frontend failure; stopping");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Ok(Ok(request)) => {
                if let Err(e) = backend.send(request).await {
                    warn!(error = %e, "request proxy backend send failed");
                }
            }
        }
        // Replies: dealer -> router; the leading frame addresses the client.
        match timeout(POLL_TIMEOUT, backend.recv()).await {
            Err(_) => {}
            Ok(Err(e)) => {
                error!(error = %e, "request proxy backend failure; stopping");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Ok(Ok(reply)) => {
                if let Err(e) = frontend.send(reply).await {
                    warn!(error = %e, "request proxy frontend send failed");
                }
            }
        }
    }
    debug!("router/dealer proxy loop exited");
}
