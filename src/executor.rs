//! Task executors that promise nodes submit their resolution work to.
//!
//! [`Executor`] is a fixed pool of worker threads fed by an unbounded queue.
//! Tasks carry no ordering guarantee relative to each other. [`ImmediateExecutor`]
//! runs every task on the submitting thread.
//!
//! A process-wide default is available through [`global`]. It is built on first
//! use unless an explicitly constructed executor was installed beforehand with
//! [`install_global`].
//!
//! # Example
//!
//! ```
//! use promise_tree::{Executor, Schedule};
//! use std::sync::mpsc::channel;
//!
//! let executor = Executor::builder().pool_size(2).build().unwrap();
//! let (tx, rx) = channel();
//! executor.post(Box::new(move || tx.send(1).unwrap())).unwrap();
//! assert_eq!(rx.recv().unwrap(), 1);
//! executor.shutdown();
//! ```

use crate::error::{Error, Result};
use crate::safe_call::panic_message;
use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, info_span};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts tasks for asynchronous execution.
///
/// `post` returns as soon as the task is queued. An implementation that can no
/// longer run tasks returns [`Error::ExecutorShutdown`] and drops the task.
pub trait Schedule: Send + Sync {
    fn post(&self, task: Task) -> Result<()>;
}

/// Counters describing executor activity.
///
/// All counters are atomic and can be read at any time without locking.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Tasks accepted by `post`
    pub tasks_submitted: AtomicU64,
    /// Tasks that ran to completion or panicked
    pub tasks_completed: AtomicU64,
    /// Tasks that panicked inside a worker
    pub tasks_panicked: AtomicU64,
}

impl ExecutorStats {
    pub fn snapshot(&self) -> ExecutorStatsSnapshot {
        ExecutorStatsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
        }
    }

    /// Tasks queued or running right now
    pub fn tasks_in_flight(&self) -> u64 {
        let submitted = self.tasks_submitted.load(Ordering::Relaxed);
        let completed = self.tasks_completed.load(Ordering::Relaxed);
        submitted.saturating_sub(completed)
    }
}

/// A point-in-time copy of [`ExecutorStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorStatsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_panicked: u64,
}

/// Builder for an [`Executor`] with custom configuration
#[derive(Debug, Clone)]
pub struct ExecutorBuilder {
    pool_size: usize,
    thread_name: String,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get().max(1),
            thread_name: "promise-worker".to_string(),
        }
    }
}

impl ExecutorBuilder {
    /// Set the number of worker threads
    ///
    /// Default is the number of CPU cores.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    /// Set the worker thread name prefix; workers are named `<prefix>-<index>`
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Build the executor and start its worker threads
    pub fn build(self) -> Result<Executor> {
        Executor::new_with_config(self)
    }
}

/// A fixed pool of worker threads draining one shared queue.
pub struct Executor {
    task_tx: RwLock<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pool_size: usize,
    stats: Arc<ExecutorStats>,
}

impl Executor {
    /// Create an executor with default configuration
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::default()
    }

    fn new_with_config(config: ExecutorBuilder) -> Result<Self> {
        let (task_tx, task_rx) = unbounded::<Task>();
        let stats = Arc::new(ExecutorStats::default());
        let mut workers = Vec::with_capacity(config.pool_size);

        for i in 0..config.pool_size {
            let rx = task_rx.clone();
            let worker_stats = stats.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, i))
                .spawn(move || run_worker(rx, worker_stats))
                .map_err(|e| Error::Spawn(e.to_string()))?;
            workers.push(handle);
        }

        info!(pool_size = config.pool_size, "executor started");
        Ok(Self {
            task_tx: RwLock::new(Some(task_tx)),
            workers: Mutex::new(workers),
            pool_size: config.pool_size,
            stats,
        })
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    /// Get the number of worker threads
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn is_running(&self) -> bool {
        self.task_tx.read().is_some()
    }

    /// Stop accepting tasks and wait for the workers to drain the queue.
    ///
    /// Calling this from one of the executor's own workers stops the pool
    /// without joining the calling thread.
    pub fn shutdown(&self) {
        if self.task_tx.write().take().is_none() {
            return;
        }
        let current = thread::current().id();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            let _ = worker.join();
        }
        info!("executor stopped");
    }
}

impl Schedule for Executor {
    fn post(&self, task: Task) -> Result<()> {
        let guard = self.task_tx.read();
        let tx = guard.as_ref().ok_or(Error::ExecutorShutdown)?;
        tx.send(task).map_err(|_| Error::ExecutorShutdown)?;
        self.stats.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn run_worker(task_rx: Receiver<Task>, stats: Arc<ExecutorStats>) {
    let thread_name = thread::current()
        .name()
        .unwrap_or("promise-worker")
        .to_string();
    let _span = info_span!("worker", name = %thread_name).entered();
    debug!("Worker starting");

    for task in task_rx.iter() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
            stats.tasks_panicked.fetch_add(1, Ordering::Relaxed);
            error!(panic = %panic_message(payload.as_ref()), "task panicked in worker");
        }
        stats.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    debug!("Worker stopped");
}

/// Runs every task synchronously on the thread that posts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateExecutor;

impl Schedule for ImmediateExecutor {
    fn post(&self, task: Task) -> Result<()> {
        task();
        Ok(())
    }
}

static GLOBAL: OnceCell<Arc<dyn Schedule>> = OnceCell::new();

/// The process-wide default executor.
///
/// Built with [`Executor::new`] on first use unless [`install_global`] ran
/// first. If no worker can be spawned the registry falls back to
/// [`ImmediateExecutor`] and logs the failure.
pub fn global() -> Arc<dyn Schedule> {
    GLOBAL
        .get_or_init(|| match Executor::new() {
            Ok(executor) => {
                info!(pool_size = executor.pool_size(), "global executor initialized");
                Arc::new(executor)
            }
            Err(e) => {
                error!(error = %e, "global executor unavailable, running tasks inline");
                Arc::new(ImmediateExecutor)
            }
        })
        .clone()
}

/// Install `executor` as the process-wide default.
///
/// Fails with [`Error::GlobalExecutorAlreadySet`] once [`global`] has been
/// called or another executor was installed.
pub fn install_global(executor: Arc<dyn Schedule>) -> Result<()> {
    GLOBAL
        .set(executor)
        .map_err(|_| Error::GlobalExecutorAlreadySet)?;
    info!("global executor installed");
    Ok(())
}
