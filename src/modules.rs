//! Module lifecycle scaffold.
//!
//! A module is a set of long-lived [`Process`]es (heartbeat publisher,
//! packet cache, ...) started together and stopped together in reverse
//! order, each hosted by the shared [`crate::Context`].

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::Result;

/// One long-lived component of a module.
#[async_trait]
pub trait Process: Send + Sync {
    /// Stable name for registration and logs.
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Owns a module's processes and drives their shared lifecycle.
#[derive(Default)]
pub struct ProcessManager {
    processes: Vec<Box<dyn Process>>,
}

impl ProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a process; duplicate names are replaced with a warning.
    pub fn insert(&mut self, process: Box<dyn Process>) {
        if let Some(index) = self
            .processes
            .iter()
            .position(|existing| existing.name() == process.name())
        {
            warn!(name = process.name(), "replacing registered process");
            self.processes[index] = process;
        } else {
            self.processes.push(process);
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.processes.iter().any(|process| process.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Starts every process in registration order; on failure the
    /// already-started processes are stopped again, in reverse.
    pub async fn start_all(&mut self) -> Result<()> {
        for index in 0..self.processes.len() {
            let name = self.processes[index].name().to_string();
            if let Err(e) = self.processes[index].start().await {
                error!(name = %name, error = %e, "process failed to start; unwinding");
                for started in self.processes[..index].iter_mut().rev() {
                    started.stop().await;
                }
                return Err(e);
            }
            info!(name = %name, "process started");
        }
        Ok(())
    }

    /// Stops every process in reverse registration order.
    pub async fn stop_all(&mut self) {
        for process in self.processes.iter_mut().rev() {
            let name = process.name().to_string();
            process.stop().await;
            info!(name = %name, "process stopped");
        }
    }

    #[must_use]
    pub fn any_running(&self) -> bool {
        self.processes.iter().any(|process| process.is_running())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Recorder {
        name: String,
        running: bool,
        counter: Arc<AtomicUsize>,
        started_at: Arc<AtomicUsize>,
        stopped_at: Arc<AtomicUsize>,
        fail_start: bool,
    }

    impl Recorder {
        fn new(name: &str, counter: &Arc<AtomicUsize>, fail_start: bool) -> Self {
            Self {
                name: name.to_string(),
                running: false,
                counter: Arc::clone(counter),
                started_at: Arc::new(AtomicUsize::new(0)),
                stopped_at: Arc::new(AtomicUsize::new(0)),
                fail_start,
            }
        }
    }

    #[async_trait]
    impl Process for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(crate::error::Error::Fatal("refused".to_string()));
            }
            self.running = true;
            self.started_at
                .store(self.counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&mut self) {
            self.running = false;
            self.stopped_at
                .store(self.counter.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    #[tokio::test]
    async fn stop_reverses_start_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let first = Recorder::new("first", &counter, false);
        let second = Recorder::new("second", &counter, false);
        let first_stopped = Arc::clone(&first.stopped_at);
        let second_stopped = Arc::clone(&second.stopped_at);

        let mut manager = ProcessManager::new();
        manager.insert(Box::new(first));
        manager.insert(Box::new(second));
        assert_eq!(manager.len(), 2);
        manager.start_all().await.unwrap();
        assert!(manager.any_running());
        manager.stop_all().await;
        assert!(!manager.any_running());
        // second stopped before first
        assert!(second_stopped.load(Ordering::SeqCst) < first_stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_start_unwinds_earlier_processes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let good = Recorder::new("good", &counter, false);
        let good_stopped = Arc::clone(&good.stopped_at);
        let bad = Recorder::new("bad", &counter, true);

        let mut manager = ProcessManager::new();
        manager.insert(Box::new(good));
        manager.insert(Box::new(bad));
        assert!(manager.start_all().await.is_err());
        assert!(!manager.any_running());
        assert!(good_stopped.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn duplicate_names_replace() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut manager = ProcessManager::new();
        manager.insert(Box::new(Recorder::new("only", &counter, false)));
        manager.insert(Box::new(Recorder::new("only", &counter, false)));
        assert_eq!(manager.len(), 1);
        assert!(manager.contains("only"));
    }
}
