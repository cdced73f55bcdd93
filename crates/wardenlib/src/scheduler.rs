use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job as SchedulerJob, JobScheduler, JobSchedulerError};

use crate::broker::QoS;
use crate::config::periodic::PeriodicTaskConfig;
use crate::context::TransformContext;
use crate::helpers::{HelperInput, HelperOutcome, HelperRegistry};
use crate::message::Message;
use crate::target::Target;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Scheduler(#[from] JobSchedulerError),
}

/// One tick's output, handed back to whoever drives the engine so it can
/// re-enter the pipeline as a synthetic message.
pub struct PeriodicTick {
    pub task_name: String,
    pub message: Message,
    /// Non-empty when the task declared an explicit target list, in which
    /// case the tick bypasses topic matching and goes straight to those
    /// targets (see `DESIGN.md` for this resolved ambiguity).
    pub direct_targets: Vec<Target>,
}

/// Runs user-declared periodic jobs: invokes a named helper on an
/// interval and turns its return value into a [`PeriodicTick`].
/// Supports one-shot, fixed-count, and infinitely-repeated jobs against a
/// `JobScheduler`.
pub struct PeriodicScheduler {
    scheduler: JobScheduler,
}

impl PeriodicScheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        Ok(Self {
            scheduler: JobScheduler::new().await?,
        })
    }

    pub async fn schedule(
        &self,
        task: &PeriodicTaskConfig,
        helpers: Arc<HelperRegistry>,
        tick_tx: mpsc::Sender<PeriodicTick>,
    ) -> Result<(), SchedulerError> {
        let interval = Duration::from_secs(task.interval_seconds.max(1));
        let running = Arc::new(AtomicBool::new(false));
        let task_name = task.name.clone();
        let topic = task
            .topic
            .clone()
            .unwrap_or_else(|| format!("_periodic/{}", task.name));
        let function_reference = task.function_reference.clone();
        let direct_targets = task.targets();
        let helpers_for_immediate = helpers.clone();
        let tick_tx_for_immediate = tick_tx.clone();
        // A fixed `count` is tracked outside the scheduler's own job state
        // and the job removes itself once exhausted.
        let remaining = task.count.map(AtomicU32::new).map(Arc::new);

        let job = SchedulerJob::new_repeated_async(interval, move |uuid, scheduler| {
            let running = running.clone();
            let helpers = helpers.clone();
            let tick_tx = tick_tx.clone();
            let task_name = task_name.clone();
            let topic = topic.clone();
            let function_reference = function_reference.clone();
            let direct_targets = direct_targets.clone();
            let remaining = remaining.clone();

            Box::pin(async move {
                // A task's ticks are serialized: if the previous tick is
                // still running, this one is skipped and logged, never
                // queued.
                if running.swap(true, Ordering::SeqCst) {
                    tracing::warn!(task = %task_name, "previous tick still running, skipping this tick");
                    return;
                }

                run_tick(
                    &task_name,
                    &topic,
                    &function_reference,
                    &direct_targets,
                    &helpers,
                    &tick_tx,
                )
                .await;

                running.store(false, Ordering::SeqCst);

                if let Some(remaining) = &remaining {
                    if remaining.fetch_sub(1, Ordering::SeqCst) <= 1 {
                        tracing::debug!(task = %task_name, "fixed-count periodic task exhausted, removing");
                        let _ = scheduler.remove(&uuid).await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;

        if task.run_immediately {
            self.schedule_immediate(task, helpers_for_immediate, tick_tx_for_immediate).await?;
        }

        Ok(())
    }

    /// Fires one tick at near-zero delay so `run_immediately` tasks don't
    /// wait a full `interval_seconds` for their first invocation.
    /// Expressed as a one-shot job; the repeated job's serialization guard
    /// is unnecessary here since this always runs before the repeated
    /// job's first due tick.
    async fn schedule_immediate(
        &self,
        task: &PeriodicTaskConfig,
        helpers: Arc<HelperRegistry>,
        tick_tx: mpsc::Sender<PeriodicTick>,
    ) -> Result<(), SchedulerError> {
        let task_name = task.name.clone();
        let topic = task
            .topic
            .clone()
            .unwrap_or_else(|| format!("_periodic/{}", task.name));
        let function_reference = task.function_reference.clone();
        let direct_targets = task.targets();

        let job = SchedulerJob::new_one_shot_async(Duration::from_millis(0), move |_uuid, _scheduler| {
            let helpers = helpers.clone();
            let tick_tx = tick_tx.clone();
            let task_name = task_name.clone();
            let topic = topic.clone();
            let function_reference = function_reference.clone();
            let direct_targets = direct_targets.clone();

            Box::pin(async move {
                run_tick(&task_name, &topic, &function_reference, &direct_targets, &helpers, &tick_tx).await;
            })
        })?;

        self.scheduler.add(job).await?;
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler.start().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.scheduler.shutdown().await?;
        Ok(())
    }
}

async fn run_tick(
    task_name: &str,
    topic: &str,
    function_reference: &str,
    direct_targets: &[Target],
    helpers: &HelperRegistry,
    tick_tx: &mpsc::Sender<PeriodicTick>,
) {
    let context = TransformContext::empty(topic.to_string());
    let input = HelperInput {
        topic,
        payload: &[],
        section_name: task_name,
        context: &context,
        topic_targets: direct_targets,
    };

    let payload = match helpers.call(function_reference, &input) {
        HelperOutcome::Keep(value) => value.to_string().into_bytes(),
        HelperOutcome::Drop => return,
        HelperOutcome::Error(detail) => {
            tracing::warn!(task = task_name, function = function_reference, error = %detail, "periodic task function failed");
            return;
        }
    };

    let message = Message::new(topic.to_string(), payload, QoS::AtMostOnce, false);
    let tick = PeriodicTick {
        task_name: task_name.to_string(),
        message,
        direct_targets: direct_targets.to_vec(),
    };
    if tick_tx.send(tick).await.is_err() {
        tracing::warn!(task = task_name, "no receiver for periodic tick, dropping");
    }
}
