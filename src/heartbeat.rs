//! Heartbeat publisher process.
//!
//! Two cooperating tasks around a status queue: a ticker that stamps and
//! enqueues the canonical status every interval, and a sender that drains
//! the queue onto the heartbeat broadcast. The sender opens with a
//! synthetic `Alive` and closes with a final `Disconnected`, so the last
//! word is sent even when the ticker is already gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::domain::ModuleName;
use crate::error::{Error, Result};
use crate::messages::{ModuleStatus, Status};
use crate::modules::Process;
use crate::queue::BoundedQueue;
use crate::socket::Publisher;

const SENDER_POLL: Duration = Duration::from_millis(10);
const JOIN_GRACE: Duration = Duration::from_secs(5);
const STATUS_QUEUE_DEPTH: usize = 1024;

/// Options for [`HeartbeatProcess`].
#[derive(Debug, Clone)]
pub struct HeartbeatProcessOptions {
    pub module_name: ModuleName,
    /// Cadence of the ticker.
    pub interval: Duration,
}

impl HeartbeatProcessOptions {
    pub fn new(module_name: ModuleName) -> Self {
        Self {
            module_name,
            interval: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Long-lived, queue-decoupled status publisher.
pub struct HeartbeatProcess {
    context: Arc<Context>,
    options: Option<HeartbeatProcessOptions>,
    publisher: Option<Arc<tokio::sync::Mutex<Publisher>>>,
    queue: Arc<BoundedQueue<Status>>,
    canonical: Arc<Mutex<Status>>,
    running: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl HeartbeatProcess {
    #[must_use]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            options: None,
            publisher: None,
            queue: Arc::new(BoundedQueue::new(STATUS_QUEUE_DEPTH)),
            canonical: Arc::new(Mutex::new(Status::new())),
            running: Arc::new(AtomicBool::new(false)),
            ticker: None,
            sender: None,
        }
    }

    /// Adopts an already-initialized publisher for the heartbeat
    /// broadcast.
    pub async fn initialize(
        &mut self,
        options: HeartbeatProcessOptions,
        publisher: Publisher,
    ) -> Result<()> {
        if !publisher.is_initialized() {
            return Err(Error::InvalidArgument(
                "heartbeat publisher is not initialized".to_string(),
            ));
        }
        self.halt().await;
        self.publisher = Some(Arc::new(tokio::sync::Mutex::new(publisher)));
        self.options = Some(options);
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.publisher.is_some()
    }

    /// Replaces the canonical status the ticker publishes.
    pub fn set_status(&self, status: Status) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized("heartbeat process"));
        }
        if let Ok(mut canonical) = self.canonical.lock() {
            *canonical = status;
        }
        Ok(())
    }

    /// Publishes `status` outside the tick cadence.
    pub async fn send_status(&self, status: Status) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized("heartbeat process"));
        }
        if !self.queue.push(status).await {
            return Err(Error::Fatal("heartbeat queue closed".to_string()));
        }
        Ok(())
    }

    async fn launch(&mut self) -> Result<()> {
        let options = self
            .options
            .clone()
            .ok_or(Error::NotInitialized("heartbeat process"))?;
        let publisher = self
            .publisher
            .clone()
            .ok_or(Error::NotInitialized("heartbeat process"))?;
        self.halt().await;

        let module: String = options.module_name.clone().into();
        {
            let mut canonical = self
                .canonical
                .lock()
                .map_err(|_| Error::Fatal("heartbeat status lock poisoned".to_string()))?;
            canonical.set_module(module.clone())?;
            canonical.set_module_status(ModuleStatus::Alive);
            canonical.set_time_stamp_to_now();
        }
        self.running.store(true, Ordering::SeqCst);

        // Sender: synthetic Alive, drain the queue, final Disconnected.
        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.queue);
        let sender_module = module.clone();
        self.sender = Some(self.context.spawn(async move {
            debug!("heartbeat sender starting");
            let mut opening = Status::new();
            let _ = opening.set_module(sender_module.clone());
            opening.set_module_status(ModuleStatus::Alive);
            if let Err(e) = publisher.lock().await.send(&opening).await {
                error!(error = %e, "failed to send start status");
            }
            while running.load(Ordering::SeqCst) {
                if let Some(status) = queue.pop_timeout(SENDER_POLL).await {
                    if let Err(e) = publisher.lock().await.send(&status).await {
                        error!(error = %e, "failed to send status");
                    }
                }
            }
            let mut closing = Status::new();
            let _ = closing.set_module(sender_module);
            closing.set_module_status(ModuleStatus::Disconnected);
            if let Err(e) = publisher.lock().await.send(&closing).await {
                error!(error = %e, "failed to send exit status");
            }
            debug!("heartbeat sender exited");
        }));

        // Ticker: stamp and enqueue the canonical status every interval.
        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.queue);
        let canonical = Arc::clone(&self.canonical);
        let interval = options.interval;
        self.ticker = Some(self.context.spawn(async move {
            debug!(?interval, "heartbeat ticker starting");
            while running.load(Ordering::SeqCst) {
                sleep(interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let status = {
                    let Ok(mut canonical) = canonical.lock() else {
                        break;
                    };
                    canonical.set_time_stamp_to_now();
                    canonical.clone()
                };
                queue.push(status).await;
            }
            debug!("heartbeat ticker exited");
        }));
        Ok(())
    }

    async fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            // The ticker may be mid-sleep; it holds nothing worth waiting
            // out the interval for.
            ticker.abort();
            let _ = ticker.await;
        }
        if let Some(sender) = self.sender.take() {
            if timeout(JOIN_GRACE, sender).await.is_err() {
                warn!("heartbeat sender did not exit within grace; continuing shutdown");
            }
        }
    }
}

#[async_trait::async_trait]
impl Process for HeartbeatProcess {
    fn name(&self) -> &str {
        "Heartbeat"
    }

    async fn start(&mut self) -> Result<()> {
        self.launch().await
    }

    async fn stop(&mut self) {
        self.halt().await;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
