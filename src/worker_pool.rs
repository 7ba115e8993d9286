//! Elastic worker pool.
//!
//! Grounded on `examples/original_source/workers_pool.go`: jobs are handed
//! to an existing idle worker if one is free, otherwise a new worker is
//! spawned on the spot. The Go original expresses this with an unbuffered
//! channel and a `select { case jobs <- j: default: spawn(); jobs <- j }`.
//! Tokio's `mpsc` has no zero-capacity option, so this is approximated with
//! a small bounded channel: `try_send` stands in for the non-blocking
//! `select` arm, and a full channel triggers a new worker exactly as a
//! failed non-blocking send does in the original.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A unit of work a pool worker runs to completion.
pub type Job = Box<dyn FnOnce() -> futures_lite_future::BoxFuture + Send + 'static>;

/// Minimal boxed-future alias so `worker_pool` doesn't need a direct
/// dependency on a futures crate this crate doesn't already pull in.
mod futures_lite_future {
    use std::future::Future;
    use std::pin::Pin;
    pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Elastic pool of tasks draining a shared job queue. New workers spawn
/// on demand when the queue is momentarily full, and idle workers simply
/// park on `recv()` forever, mirroring the Go original's goroutine-per-
/// worker design.
pub struct WorkerPool {
    jobs: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    worker_count: Arc<AtomicUsize>,
    closed: Arc<std::sync::atomic::AtomicBool>,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Queue depth before a `submit` triggers spawning an extra worker. Kept
/// small so "try the existing pool, else spawn" stays close to the
/// unbuffered-channel semantics of the original.
const QUEUE_CAPACITY: usize = 1;

impl WorkerPool {
    /// Start a pool with `initial_workers` tasks already running.
    pub fn new(initial_workers: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY.max(1));
        let pool = Arc::new(Self {
            jobs: std::sync::Mutex::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            worker_count: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            handles: std::sync::Mutex::new(Vec::new()),
        });
        for _ in 0..initial_workers.max(1) {
            pool.spawn_worker();
        }
        pool
    }

    fn spawn_worker(self: &Arc<Self>) {
        let receiver = self.receiver.clone();
        self.worker_count.fetch_add(1, Ordering::SeqCst);
        let worker_count = self.worker_count.clone();
        let worker_id = worker_count.load(Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            tracing::debug!(worker_id, "worker started");
            loop {
                let job = {
                    let mut rx = receiver.lock().await;
                    rx.recv().await
                };
                match job {
                    Some(job) => job().await,
                    None => break,
                }
            }
            tracing::debug!(worker_id, "worker stopped");
            worker_count.fetch_sub(1, Ordering::SeqCst);
        });
        self.handles.lock().unwrap().push(handle);
    }

    /// Submit a job. If every worker is busy, a new one is spawned to take
    /// it immediately, matching the original's "never block the caller"
    /// contract — dispatch from the server's reader loop must not stall on
    /// a slow handler elsewhere.
    pub async fn submit(self: &Arc<Self>, job: Job) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("submit called on a closed worker pool");
            return;
        }
        let sender = self.jobs.lock().unwrap().clone();
        let Some(sender) = sender else {
            tracing::warn!("submit called on a closed worker pool");
            return;
        };
        match sender.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::debug!("worker pool saturated, spawning additional worker");
                self.spawn_worker();
                let _ = sender.send(job).await;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("worker pool channel closed");
            }
        }
    }

    /// Current number of live worker tasks.
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst)
    }

    /// Stop accepting new jobs and wait for every spawned worker to drain
    /// its remaining queue and exit, mirroring the original's
    /// `close(wp.jobs); wp.wg.Wait()`. Jobs already queued or in flight run
    /// to completion; only the acceptance of new jobs is refused immediately.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.jobs.lock().unwrap().take();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
    }
}
