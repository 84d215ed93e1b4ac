//! Background Worker Pool
//!
//! Bounded queue drained by a fixed set of worker tasks. Fan-out and
//! notification jobs are submitted here so the request path never waits on
//! them. Each job runs in its own task under a timeout, which keeps a panic
//! or a hung backend call from taking a worker down with it.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Job {
    name: &'static str,
    future: BoxFuture<'static, ()>,
}

/// Accepted-but-unfinished job count, shared with the workers.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Aborts the job task when dropped, so a worker aborted mid-job takes its
/// job down with it instead of detaching it.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct PoolInner {
    sender: mpsc::Sender<Job>,
    pending: Arc<Pending>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

// == Background Pool ==
/// Cloneable handle to the worker pool. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct BackgroundPool {
    inner: Arc<PoolInner>,
}

impl BackgroundPool {
    pub fn new(worker_count: usize, queue_capacity: usize, job_timeout: Duration) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let pending = Arc::new(Pending::default());

        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    pending.clone(),
                    job_timeout,
                ))
            })
            .collect();

        info!(
            worker_count,
            queue_capacity,
            job_timeout_ms = job_timeout.as_millis() as u64,
            "background pool started"
        );

        Self {
            inner: Arc::new(PoolInner {
                sender,
                pending,
                workers: Mutex::new(workers),
            }),
        }
    }

    /// Queues `future` without waiting. A full or closed queue drops the job.
    pub fn submit<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.pending.enter();
        let job = Job {
            name,
            future: future.boxed(),
        };
        if let Err(err) = self.inner.sender.try_send(job) {
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "pool closed",
            };
            warn!(job = name, reason, "background job dropped");
            self.inner.pending.leave();
        }
    }

    /// Number of accepted jobs that have not finished yet.
    pub fn pending(&self) -> usize {
        self.inner.pending.count.load(Ordering::SeqCst)
    }

    /// Resolves once every accepted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.inner.pending.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Waits up to `grace` for queued work, then stops the workers. Jobs still
    /// running or queued at that point are cancelled, and `pending` keeps
    /// counting them.
    pub async fn shutdown(&self, grace: Duration) {
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            warn!(pending = self.pending(), "background pool shutdown grace expired");
        }
        let workers = match self.inner.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            worker.abort();
        }
        info!("background pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Job>>>,
    pending: Arc<Pending>,
    job_timeout: Duration,
) {
    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(Job { name, future }) = job else {
            debug!(worker = id, "job queue closed, worker exiting");
            return;
        };

        let mut task = AbortOnDrop(tokio::spawn(future));
        match tokio::time::timeout(job_timeout, &mut task.0).await {
            Ok(Ok(())) => debug!(worker = id, job = name, "background job finished"),
            Ok(Err(err)) if err.is_panic() => {
                error!(worker = id, job = name, "background job panicked")
            }
            Ok(Err(err)) => warn!(worker = id, job = name, error = %err, "background job cancelled"),
            Err(_) => {
                task.0.abort();
                warn!(
                    worker = id,
                    job = name,
                    timeout_ms = job_timeout.as_millis() as u64,
                    "background job timed out"
                );
            }
        }
        pending.leave();
    }
}
