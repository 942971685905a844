// ─── Task Queue ───
// Fixed-size worker pool over a shared FIFO of retryable tasks.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::core::error::{LauncherError, LauncherResult};

type Task = Arc<dyn Fn() -> BoxFuture<'static, LauncherResult<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct QueuePolicy {
    pub workers: usize,
    /// Failed attempts tolerated across the whole queue.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            workers: 8,
            max_retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

/// A pool of workers draining a list of fallible, idempotent tasks.
///
/// - Workers pop under the queue lock and run the task outside it.
/// - A failed task is put back at the tail after `backoff` while the
///   queue-wide retry counter is below `max_retries`. The counter is shared
///   by every task in the queue, so one flaky task spends the budget of all.
/// - Once the budget is spent the failure is permanent: dispatch stops in
///   every worker and [`TaskQueue::wait`] returns that error. Tasks already
///   running are left to finish.
///
/// Cloning yields another handle to the same queue, which lets a task
/// enqueue follow-up work.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

struct Inner {
    policy: QueuePolicy,
    pending: Mutex<VecDeque<Task>>,
    remain: AtomicUsize,
    total: AtomicUsize,
    retries: AtomicU32,
    active_workers: AtomicUsize,
    failed: AtomicBool,
    failure: Mutex<Option<LauncherError>>,
    changed: Notify,
}

impl TaskQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                pending: Mutex::new(VecDeque::new()),
                remain: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                retries: AtomicU32::new(0),
                active_workers: AtomicUsize::new(0),
                failed: AtomicBool::new(false),
                failure: Mutex::new(None),
                changed: Notify::new(),
            }),
        }
    }

    /// Append a task. It may be called again on retry, so it must be safe to
    /// run more than once.
    pub fn add_task<F, Fut>(&self, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LauncherResult<()>> + Send + 'static,
    {
        let task: Task =
            Arc::new(move || -> BoxFuture<'static, LauncherResult<()>> { Box::pin(task()) });
        self.inner.remain.fetch_add(1, Ordering::AcqRel);
        self.inner.total.fetch_add(1, Ordering::AcqRel);
        self.inner.pending().push_back(task);
        self.inner.changed.notify_waiters();
    }

    /// Tasks not yet completed successfully.
    pub fn remain(&self) -> usize {
        self.inner.remain.load(Ordering::Acquire)
    }

    /// Tasks ever enqueued.
    pub fn total(&self) -> usize {
        self.inner.total.load(Ordering::Acquire)
    }

    /// Completion ratio in `0.0..=1.0`; an empty queue counts as complete.
    pub fn progress(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        1.0 - self.remain() as f32 / total as f32
    }

    pub fn has_failed(&self) -> bool {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Start the worker pool. Calling it while workers are alive is a no-op.
    pub fn run(&self) {
        if self.inner.active_workers.load(Ordering::Acquire) > 0 {
            return;
        }
        let workers = self.inner.policy.workers.max(1);
        debug!(
            "Starting task queue: {} tasks, {} workers",
            self.remain(),
            workers
        );
        for id in 0..workers {
            self.inner.active_workers.fetch_add(1, Ordering::AcqRel);
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                work(&inner, id).await;
                inner.active_workers.fetch_sub(1, Ordering::AcqRel);
                inner.changed.notify_waiters();
            });
        }
    }

    /// Suspend until every task has succeeded or one failed permanently.
    ///
    /// Must be paired with [`TaskQueue::run`]; waiting on a non-empty queue
    /// that was never started does not return.
    pub async fn wait(&self) -> LauncherResult<()> {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if self.has_failed() {
                return Err(self.inner.failure().take().unwrap_or_else(|| {
                    LauncherError::Other("task queue already failed".into())
                }));
            }
            if self.remain() == 0 {
                return Ok(());
            }
            changed.await;
        }
    }

    /// `run()` followed by `wait()`.
    pub async fn run_to_completion(&self) -> LauncherResult<()> {
        self.run();
        self.wait().await
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(QueuePolicy::default())
    }
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure(&self) -> MutexGuard<'_, Option<LauncherError>> {
        self.failure.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, err: LauncherError) {
        {
            let mut slot = self.failure();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.failed.store(true, Ordering::Release);
        self.changed.notify_waiters();
    }

    fn finished(&self) -> bool {
        self.failed.load(Ordering::Acquire) || self.remain.load(Ordering::Acquire) == 0
    }
}

async fn work(inner: &Inner, id: usize) {
    loop {
        let changed = inner.changed.notified();
        tokio::pin!(changed);
        changed.as_mut().enable();

        if inner.finished() {
            break;
        }

        let next = inner.pending().pop_front();
        let Some(task) = next else {
            // Remaining tasks are in flight elsewhere; they may fail and come back.
            changed.await;
            continue;
        };

        match task().await {
            Ok(()) => {
                inner.remain.fetch_sub(1, Ordering::AcqRel);
                inner.changed.notify_waiters();
            }
            Err(err) => {
                let attempt = inner.retries.fetch_add(1, Ordering::AcqRel);
                if attempt < inner.policy.max_retries {
                    warn!(
                        "Task failed on worker {} (retry {}/{}): {}",
                        id,
                        attempt + 1,
                        inner.policy.max_retries,
                        err
                    );
                    tokio::time::sleep(inner.policy.backoff).await;
                    inner.pending().push_back(task);
                    inner.changed.notify_waiters();
                } else {
                    error!("Task failed permanently on worker {}: {}", id, err);
                    inner.fail(err);
                    break;
                }
            }
        }
    }
}
