//! Broadcast (xpub/xsub) proxy.
//!
//! Publishers connect to the frontend and subscribers to the backend; the
//! proxy forwards every frame from one to the other. The underlying
//! library has no xpub/xsub socket roles, so the proxy emulates them with
//! a bound subscriber frontend that subscribes to every topic and a bound
//! publisher backend; per-publisher, per-topic ordering is preserved.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::socket::Command;

use super::ProxyOptions;

const POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(10);
const JOIN_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

pub struct BroadcastProxy {
    context: Arc<Context>,
    options: Option<ProxyOptions>,
    frontend: Option<SubSocket>,
    backend: Option<PubSocket>,
    control: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    forwarded: Arc<AtomicU64>,
}

impl BroadcastProxy {
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
            forwarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Binds both sides of the proxy.
    pub async fn initialize(&mut self, options: ProxyOptions) -> Result<()> {
        options.validate()?;
        self.stop().await;
        let mut frontend = SubSocket::new();
        frontend.bind(&options.frontend_address).await?;
        frontend.subscribe("").await?;
        let mut backend = PubSocket::new();
        backend.bind(&options.backend_address).await?;
        debug!(
            frontend = %options.frontend_address,
            backend = %options.backend_address,
            "broadcast proxy bound"
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

    /// Total messages forwarded since the last start.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Launches the forwarder.
    pub async fn start(&mut self) -> Result<()> {
        let frontend = self
            .frontend
            .take()
            .ok_or(Error::NotInitialized("broadcast proxy"))?;
        let backend = self
            .backend
            .take()
            .ok_or(Error::NotInitialized("broadcast proxy"))?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        self.forwarded.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let forwarded = Arc::clone(&self.forwarded);
        let task = self
            .context
            .spawn(forward_loop(frontend, backend, running, control_rx, forwarded));
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

    /// Terminates the forwarder and joins it. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Command::Terminate);
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if timeout(JOIN_GRACE, task).await.is_err() {
                warn!("broadcast proxy did not exit within grace; continuing shutdown");
            }
        }
        self.frontend = None;
        self.backend = None;
        self.options = None;
    }
}

async fn forward_loop(
    mut frontend: SubSocket,
    mut backend: PubSocket,
    running: Arc<AtomicBool>,
    mut control: mpsc::UnboundedReceiver<Command>,
    forwarded: Arc<AtomicU64>,
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
        let message = match timeout(POLL_TIMEOUT, frontend.recv()).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                error!(error = %e, "broadcast proxy frontend failure; stopping");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Ok(Ok(message)) => message,
        };
        forwarded.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = backend.send(message).await {
            warn!(error = %e, "broadcast proxy backend send failed");
        }
    }
    debug!("broadcast proxy loop exited");
}
