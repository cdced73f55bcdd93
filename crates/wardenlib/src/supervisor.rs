use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::broker::{BrokerError, BrokerMessage, QoS, SharedBroker};
use crate::config::route::{Route, TargetsSpec};
use crate::config::EngineConfig;
use crate::context::TimeZoneMode;
use crate::dispatch::DispatchQueues;
use crate::helpers::HelperRegistry;
use crate::message::Message;
use crate::pipeline::Pipeline;
use crate::registry::{RegistryError, ServiceRegistry};
use crate::scheduler::{PeriodicScheduler, PeriodicTick, SchedulerError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Owns the lifecycles of every other component. An explicit value rather
/// than a bare `fn main` or module-level singletons, so tests can
/// instantiate more than one.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ServiceRegistry>,
    helpers: HelperRegistry,
    pipeline: Pipeline,
    broker: SharedBroker,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        registry: ServiceRegistry,
        helpers: HelperRegistry,
        broker: SharedBroker,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            helpers,
            pipeline: Pipeline::new(TimeZoneMode::Local),
            broker,
        }
    }

    /// Startup order: registry (already loaded by the caller) → queues/
    /// workers → scheduler → broker connection, subscriptions last.
    /// Shutdown runs in reverse.
    pub async fn run(self, mut shutdown_signal: broadcast::Receiver<()>) -> Result<(), EngineError> {
        let failover_targets = self
            .config
            .failover
            .as_ref()
            .map(|f| f.targets.clone())
            .unwrap_or_default();

        let queues = DispatchQueues::start(
            self.config.used_targets(),
            self.registry.clone(),
            &self.config.defaults,
            failover_targets,
        );

        let mut scheduler = PeriodicScheduler::new().await?;
        let (tick_tx, mut tick_rx) = mpsc::channel::<PeriodicTick>(32);
        let helpers = Arc::new(self.helpers.clone());
        for task in &self.config.periodic {
            scheduler.schedule(task, helpers.clone(), tick_tx.clone()).await?;
        }
        drop(tick_tx);
        scheduler.start().await?;

        let (broker_exit_tx, broker_exit_rx) = broadcast::channel::<()>(1);
        let (broker_task, mut broker_rx, mut reconnect_rx) = self.broker.connect(broker_exit_rx).await?;

        self.subscribe_all_routes().await?;

        tracing::info!(routes = self.config.routes.len(), "engine started, subscriptions active");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signal.recv() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
                reconnected = reconnect_rx.recv() => {
                    match reconnected {
                        Ok(()) => {
                            tracing::info!("broker reconnected, reasserting subscriptions");
                            if let Err(error) = self.subscribe_all_routes().await {
                                tracing::warn!(%error, "failed to reassert subscriptions after reconnect");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => {}
                    }
                }
                incoming = broker_rx.recv() => {
                    match incoming {
                        Ok(message) => self.route_and_enqueue(message.into(), &queues, &helpers),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "broker message channel lagged, some messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::warn!("broker connection closed, stopping ingest");
                            break;
                        }
                    }
                }
                tick = tick_rx.recv() => {
                    if let Some(tick) = tick {
                        self.route_periodic_tick(tick, &queues, &helpers);
                    }
                }
            }
        }

        // Shutdown, reverse of startup order: broker first, then
        // scheduler, then queues.
        let _ = broker_exit_tx.send(());
        let _ = self.broker.disconnect().await;
        let _ = broker_task.await;

        if let Err(error) = scheduler.shutdown().await {
            tracing::warn!(%error, "error shutting down periodic scheduler");
        }

        queues.shutdown(self.config.shutdown_grace_period()).await;

        Ok(())
    }

    /// Subscribes to every configured route's topic pattern. Called once
    /// at startup and again each time the broker signals a reconnect,
    /// since a fresh session has no memory of prior subscriptions.
    async fn subscribe_all_routes(&self) -> Result<(), EngineError> {
        for route in &self.config.routes {
            self.broker
                .subscribe(&route.topic_pattern, route.qos_override.unwrap_or(QoS::AtMostOnce))
                .await?;
        }
        Ok(())
    }

    fn route_and_enqueue(&self, message: Message, queues: &DispatchQueues, helpers: &HelperRegistry) {
        for index in self.config.topic_matcher.matching_indices(&message.topic) {
            let Some(route) = self.config.routes.get(index) else {
                continue;
            };
            self.process_route(route, &message, queues, helpers);
        }
    }

    /// A periodic tick with an explicit target list bypasses topic
    /// matching and is processed as a one-off synthetic route (see
    /// `DESIGN.md` for this resolved ambiguity); one without re-enters
    /// normal route matching by topic, same as a broker message.
    fn route_periodic_tick(&self, tick: PeriodicTick, queues: &DispatchQueues, helpers: &HelperRegistry) {
        if tick.direct_targets.is_empty() {
            self.route_and_enqueue(tick.message, queues, helpers);
            return;
        }

        let synthetic = Route {
            name: tick.task_name,
            topic_pattern: tick.message.topic.clone(),
            targets_spec: TargetsSpec::Static {
                targets: tick.direct_targets.iter().map(|t| t.to_string()).collect(),
            },
            filter_fn: None,
            datamap_fn: None,
            alldata_fn: None,
            format_spec: None,
            priority: None,
            qos_override: None,
            ignore_retained: Some(false),
            retry_limit: None,
        };
        self.process_route(&synthetic, &tick.message, queues, helpers);
    }

    fn process_route(&self, route: &Route, message: &Message, queues: &DispatchQueues, helpers: &HelperRegistry) {
        let jobs = self
            .pipeline
            .process(route, message, &self.config.defaults, helpers, &self.registry);
        for job in jobs {
            let target = job.target.clone();
            queues.enqueue(&target, job);
        }
    }
}

impl From<BrokerMessage> for Message {
    fn from(value: BrokerMessage) -> Self {
        Message::new(value.topic, value.payload, value.qos, value.retained)
    }
}
