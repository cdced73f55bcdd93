use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::GlobalDefaults;
use crate::job::Job;
use crate::registry::ServiceRegistry;
use crate::target::Target;

/// A bounded FIFO that evicts its oldest entry on overflow instead of
/// rejecting the new one. `tokio::sync::mpsc`'s bounded channel can only
/// reject the newest item on a full queue, the opposite policy, so this
/// is a small `Mutex<VecDeque>` + `Notify` in its place — the ingest side
/// (`push`) never awaits.
struct DropOldestQueue {
    state: Mutex<VecDeque<Job>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl DropOldestQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, job: Job) {
        {
            let mut queue = self.state.lock().expect("dispatch queue mutex poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("dispatch queue full, dropped oldest job");
            }
            queue.push_back(job);
        }
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<Job> {
        loop {
            {
                let mut queue = self.state.lock().expect("dispatch queue mutex poisoned");
                if let Some(job) = queue.pop_front() {
                    return Some(job);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// One bounded queue and one worker per `(service, target-name)` pair.
/// Enqueue is O(1) and never blocks the ingest path.
pub struct DispatchQueues {
    queues: Arc<HashMap<Target, Arc<DropOldestQueue>>>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatchQueues {
    /// Starts one worker task per target in `targets`. `failover_targets`
    /// receive Jobs whose retries are exhausted; they must already be
    /// present in `targets`, since failover targets are evaluated
    /// statically at startup.
    ///
    /// Shutdown is driven entirely through [`DispatchQueues::shutdown`]
    /// closing each queue: a worker keeps draining via `queue.pop()`
    /// until the queue is both closed and empty, so in-flight Jobs are
    /// never abandoned just because shutdown started.
    pub fn start(
        targets: Vec<Target>,
        registry: Arc<ServiceRegistry>,
        defaults: &GlobalDefaults,
        failover_targets: Vec<Target>,
    ) -> Self {
        let mut queues = HashMap::new();
        for target in &targets {
            queues.insert(target.clone(), Arc::new(DropOldestQueue::new(defaults.queue_capacity)));
        }
        let queues = Arc::new(queues);

        let default_retry_limit = defaults.retry_limit;
        let retry_backoff = Duration::from_millis(defaults.retry_backoff_ms);

        let mut workers = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(queue) = queues.get(&target).cloned() else {
                continue;
            };
            let queues = queues.clone();
            let registry = registry.clone();
            let failover_targets = failover_targets.clone();
            let target_is_failover = failover_targets.contains(&target);

            let handle = tokio::spawn(async move {
                loop {
                    let Some(mut job) = queue.pop().await else { break };

                    if registry.dispatch(&target, &job).await {
                        continue;
                    }

                    job.attempt_count += 1;
                    let limit = job.retry_limit.unwrap_or(default_retry_limit);
                    if job.attempt_count <= limit {
                        tokio::time::sleep(retry_backoff).await;
                        queue.push(job);
                        continue;
                    }

                    tracing::warn!(target = %target, attempts = job.attempt_count, "delivery permanently failed");

                    // Failover jobs that themselves fail are logged and
                    // discarded, never re-failed-over.
                    if target_is_failover {
                        tracing::warn!(target = %target, "failover target itself failed, discarding job");
                        continue;
                    }

                    for failover_target in &failover_targets {
                        let mut failover_job = job.clone();
                        failover_job.target = failover_target.clone();
                        failover_job.attempt_count = 0;
                        match queues.get(failover_target) {
                            Some(failover_queue) => failover_queue.push(failover_job),
                            None => {
                                tracing::warn!(target = %failover_target, "failover target has no active queue, discarding job");
                            }
                        }
                    }
                }
            });
            workers.push(handle);
        }

        Self { queues, workers }
    }

    /// Never blocks; drop-oldest happens internally if the target's queue
    /// is full.
    pub fn enqueue(&self, target: &Target, job: Job) {
        match self.queues.get(target) {
            Some(queue) => queue.push(job),
            None => tracing::warn!(%target, "enqueue to a target with no active queue, dropping"),
        }
    }

    pub fn dropped_count(&self, target: &Target) -> u64 {
        self.queues
            .get(target)
            .map(|q| q.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Closes every queue so workers drain what remains and exit, then
    /// waits up to `grace_period` for them to finish. Anything still
    /// pending once the grace period elapses is dropped with a summary
    /// log.
    pub async fn shutdown(mut self, grace_period: Duration) {
        for queue in self.queues.values() {
            queue.close();
        }

        let drain = async {
            for handle in self.workers.drain(..) {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(grace_period, drain).await.is_err() {
            let mut abandoned = 0u64;
            for queue in self.queues.values() {
                abandoned += queue.state.lock().expect("dispatch queue mutex poisoned").len() as u64;
            }
            tracing::warn!(abandoned, "shutdown grace period elapsed, abandoning remaining jobs");
            for handle in self.workers.drain(..) {
                handle.abort();
            }
        }
    }
}
