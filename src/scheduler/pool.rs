//! Fixed-size worker pool over a bounded queue.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised by [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker queue is full")]
    Full,
    #[error("worker pool is shut down")]
    Closed,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// OS threads fed from a bounded channel.
///
/// Submission never blocks: a full queue is reported to the caller and the
/// rejected job is dropped on the spot. After [`WorkerPool::shutdown`] any
/// job still queued is dropped without running.
pub struct WorkerPool {
    name: String,
    sender: RwLock<Option<Sender<Job>>>,
    cancelled: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `threads` workers sharing a queue of `queue` slots.
    pub fn new(name: &str, threads: usize, queue: usize) -> Result<Self, PoolError> {
        let (tx, rx) = bounded::<Job>(queue.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let cancelled = Arc::clone(&cancelled);
            let pool = name.to_string();
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    for job in rx.iter() {
                        if cancelled.load(Ordering::Acquire) {
                            drop(job);
                            continue;
                        }
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!(pool = %pool, "Worker job panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!(pool = name, threads = workers.len(), queue, "Worker pool started");

        Ok(Self {
            name: name.to_string(),
            sender: RwLock::new(Some(tx)),
            cancelled,
            workers: Mutex::new(workers),
        })
    }

    /// Queues a job without blocking.
    pub fn try_execute(&self, job: impl FnOnce() + Send + 'static) -> Result<(), PoolError> {
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(PoolError::Closed)?;
        sender.try_send(Box::new(job)).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::Full,
            TrySendError::Disconnected(_) => PoolError::Closed,
        })
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender.read().as_ref().map_or(0, |s| s.len())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Stops accepting jobs, lets queued jobs run, and joins the workers.
    pub fn drain(&self) {
        self.close_and_join();
    }

    /// Stops accepting jobs, drops queued jobs, and joins the workers once
    /// their running job returns.
    pub fn shutdown(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.close_and_join();
    }

    fn close_and_join(&self) {
        if self.sender.write().take().is_none() {
            return;
        }
        let current = std::thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            // a job shutting down its own pool cannot join itself
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
        tracing::debug!(pool = %self.name, "Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_jobs_run() {
        let pool = WorkerPool::new("test", 2, 8).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let ran = Arc::clone(&ran);
            pool.try_execute(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.drain();
        assert_eq!(ran.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_full_queue_rejects() {
        let pool = WorkerPool::new("test", 1, 1).unwrap();
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        pool.try_execute(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // worker busy, one queue slot
        pool.try_execute(|| {}).unwrap();
        assert!(matches!(pool.try_execute(|| {}), Err(PoolError::Full)));

        drop(gate_tx);
        pool.drain();
    }

    #[test]
    fn test_shutdown_drops_queued_jobs() {
        let pool = WorkerPool::new("test", 1, 4).unwrap();
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);
        let ran = Arc::new(AtomicUsize::new(0));

        pool.try_execute(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            pool.try_execute(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(gate_tx);
        });
        pool.shutdown();
        releaser.join().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(pool.try_execute(|| {}), Err(PoolError::Closed)));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new("test", 1, 4).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        pool.try_execute(|| panic!("boom")).unwrap();
        let counter = Arc::clone(&ran);
        pool.try_execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.drain();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
