//! Process-wide I/O runtime handle.
//!
//! Every socket and long-running service task is hosted by a [`Context`].
//! A standalone context owns a multi-threaded tokio runtime sized by the
//! expected aggregate throughput (roughly one worker per gigabit per
//! second); inside an existing runtime, [`Context::current`] borrows it
//! instead. Contexts are shared via `Arc` and torn down when the last owner
//! drops, after all sockets referencing them have closed.

use std::future::Future;
use std::sync::Mutex;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Context {
    /// Present only when this context owns its runtime.
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
}

impl Context {
    /// Creates a context owning a runtime with one worker per CPU.
    pub fn new() -> Result<Self> {
        Self::with_io_threads(num_cpus::get())
    }

    /// Creates a context owning a runtime with `io_threads` workers.
    pub fn with_io_threads(io_threads: usize) -> Result<Self> {
        if io_threads == 0 {
            return Err(Error::InvalidArgument(
                "context requires at least one I/O thread".to_string(),
            ));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(io_threads)
            .thread_name("seismq-io")
            .enable_all()
            .build()
            .map_err(|e| Error::Fatal(format!("failed to build runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
        })
    }

    /// Borrows the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, mirroring
    /// [`Handle::current`].
    #[must_use]
    pub fn current() -> Self {
        Self {
            runtime: Mutex::new(None),
            handle: Handle::current(),
        }
    }

    /// Handle onto the hosting runtime.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns a task onto the context's runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Shuts down an owned runtime without blocking; borrowed runtimes are
    /// untouched. Idempotent.
    pub fn shutdown(&self) {
        let owned = self
            .runtime
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None);
        if let Some(runtime) = owned {
            runtime.shutdown_background();
        }
    }
}
