//! Integration tests for the concrete scenarios enumerated against the
//! routing and dispatch engine: a static route, a templated target, a
//! fan-out, a filter drop, failover after exhausted retries, and a
//! periodic task. Exercises only the crate's public surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::mpsc;

use wardenlib::config::service::ServiceConfig;
use wardenlib::context::{TimeZoneMode, TransformContext};
use wardenlib::dispatch::DispatchQueues;
use wardenlib::pipeline::Pipeline;
use wardenlib::plugins::log::LogService;
use wardenlib::scheduler::PeriodicScheduler;
use wardenlib::{
    ContextValue, GlobalDefaults, HelperOutcome, HelperRegistry, Job, Service, ServiceContext,
    ServiceError, ServiceRegistry, Target,
};

fn route(yaml: &str) -> wardenlib::config::route::Route {
    serde_yaml::from_str(yaml).unwrap()
}

async fn log_registry(service: &str, targets: &[&str]) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry.register_plugin("log", Arc::new(LogService));
    let mut table = IndexMap::new();
    for target in targets {
        table.insert((*target).to_string(), Vec::new());
    }
    let mut services = HashMap::new();
    services.insert(service.to_string(), ServiceConfig { kind: "log".to_string(), targets: table, options: IndexMap::new() });
    registry.load(services).await.unwrap();
    registry
}

#[tokio::test]
async fn scenario_static_route() {
    let route = route(
        "name: hello\ntopic_pattern: hello/1\ntargets_spec:\n  type: static\n  targets: [\"log:info\"]\nformat_spec:\n  type: template\n  template: \"{name}: {number}\"\n",
    );
    let message = wardenlib::Message::new("hello/1", br#"{"name":"Alice","number":42}"#.to_vec(), wardenlib::QoS::AtMostOnce, false);
    let registry = log_registry("log", &["info"]).await;
    let helpers = HelperRegistry::new();
    let pipeline = Pipeline::new(TimeZoneMode::Local);

    let jobs = pipeline.process(&route, &message, &GlobalDefaults::default(), &helpers, &registry);
    assert_eq!(1, jobs.len());
    assert_eq!("Alice: 42", jobs[0].body);
    assert_eq!(Target::new("log", "info"), jobs[0].target);
}

#[tokio::test]
async fn scenario_dynamic_target() {
    let route = route(
        "name: dyn\ntopic_pattern: test/dyn\ntargets_spec:\n  type: template\n  template: \"log:{loglevel}\"\n",
    );
    let registry = log_registry("log", &["crit"]).await;
    let helpers = HelperRegistry::new();
    let pipeline = Pipeline::new(TimeZoneMode::Local);
    let defaults = GlobalDefaults::default();

    let message = wardenlib::Message::new("test/dyn", br#"{"loglevel":"crit","message":"x"}"#.to_vec(), wardenlib::QoS::AtMostOnce, false);
    let jobs = pipeline.process(&route, &message, &defaults, &helpers, &registry);
    assert_eq!(1, jobs.len());
    assert_eq!(Target::new("log", "crit"), jobs[0].target);

    let message = wardenlib::Message::new("test/dyn", br#"{"loglevel":"nonesuch"}"#.to_vec(), wardenlib::QoS::AtMostOnce, false);
    assert!(pipeline.process(&route, &message, &defaults, &helpers, &registry).is_empty());
}

#[tokio::test]
async fn scenario_fan_out() {
    let route = route(
        "name: fanout\ntopic_pattern: fan/1\ntargets_spec:\n  type: static\n  targets: [\"log:info\", \"file:f01\"]\n",
    );
    let mut registry = ServiceRegistry::new();
    registry.register_plugin("log", Arc::new(LogService));
    registry.register_plugin("file", Arc::new(wardenlib::plugins::file::FileService));
    let mut log_targets = IndexMap::new();
    log_targets.insert("info".to_string(), Vec::new());
    let mut file_targets = IndexMap::new();
    file_targets.insert("f01".to_string(), Vec::new());
    let mut services = HashMap::new();
    services.insert("log".to_string(), ServiceConfig { kind: "log".to_string(), targets: log_targets, options: IndexMap::new() });
    services.insert("file".to_string(), ServiceConfig { kind: "file".to_string(), targets: file_targets, options: IndexMap::new() });
    registry.load(services).await.unwrap();

    let message = wardenlib::Message::new("fan/1", b"x".to_vec(), wardenlib::QoS::AtMostOnce, false);
    let helpers = HelperRegistry::new();
    let pipeline = Pipeline::new(TimeZoneMode::Local);
    let jobs = pipeline.process(&route, &message, &GlobalDefaults::default(), &helpers, &registry);

    assert_eq!(2, jobs.len());
    let mut targets: Vec<String> = jobs.iter().map(|j| j.target.to_string()).collect();
    targets.sort();
    assert_eq!(vec!["file:f01", "log:info"], targets);
}

#[tokio::test]
async fn scenario_filter_drop() {
    let route = route(
        "name: filtered\ntopic_pattern: f/1\ntargets_spec:\n  type: static\n  targets: [\"log:info\"]\nfilter_fn: drop_everything\n",
    );
    let registry = log_registry("log", &["info"]).await;
    let mut helpers = HelperRegistry::new();
    helpers.register("drop_everything", Arc::new(|_input: &wardenlib::HelperInput| HelperOutcome::Keep(ContextValue::Bool(true))));
    let pipeline = Pipeline::new(TimeZoneMode::Local);
    let message = wardenlib::Message::new("f/1", b"x".to_vec(), wardenlib::QoS::AtMostOnce, false);

    assert!(pipeline.process(&route, &message, &GlobalDefaults::default(), &helpers, &registry).is_empty());
}

/// A plugin that always fails delivery, for exercising the retry and
/// failover path.
struct AlwaysFailsService;

#[async_trait]
impl Service for AlwaysFailsService {
    async fn init(&self, _context: &ServiceContext) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn deliver(&self, _context: &ServiceContext, _job: &Job) -> bool {
        false
    }
}

/// A plugin that records every delivered body, standing in for a
/// failover destination in the retry/failover scenario.
struct RecordingService {
    delivered: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Service for RecordingService {
    async fn init(&self, _context: &ServiceContext) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn deliver(&self, _context: &ServiceContext, job: &Job) -> bool {
        self.delivered.lock().unwrap().push(job.body.clone());
        true
    }
}

#[tokio::test]
async fn scenario_failure_triggers_failover() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ServiceRegistry::new();
    registry.register_plugin("file", Arc::new(AlwaysFailsService));
    registry.register_plugin("archive", Arc::new(RecordingService { delivered: delivered.clone() }));

    let mut file_targets = IndexMap::new();
    file_targets.insert("archive_primary".to_string(), Vec::new());
    let mut archive_targets = IndexMap::new();
    archive_targets.insert("backup".to_string(), Vec::new());
    let mut services = HashMap::new();
    services.insert("file".to_string(), ServiceConfig { kind: "file".to_string(), targets: file_targets, options: IndexMap::new() });
    services.insert("archive".to_string(), ServiceConfig { kind: "archive".to_string(), targets: archive_targets, options: IndexMap::new() });
    registry.load(services).await.unwrap();

    let defaults = GlobalDefaults { retry_limit: 0, retry_backoff_ms: 1, ..GlobalDefaults::default() };
    let queues = DispatchQueues::start(
        vec![Target::new("file", "archive_primary"), Target::new("archive", "backup")],
        Arc::new(registry),
        &defaults,
        vec![Target::new("archive", "backup")],
    );

    let job = Job::new(
        Target::new("file", "archive_primary"),
        None,
        "undeliverable".to_string(),
        TransformContext::empty("t"),
        None,
        "t".to_string(),
        Vec::new(),
        Vec::new(),
        None,
    );
    queues.enqueue(&Target::new("file", "archive_primary"), job);

    tokio::time::sleep(Duration::from_millis(200)).await;
    queues.shutdown(Duration::from_secs(1)).await;

    assert_eq!(vec!["undeliverable".to_string()], *delivered.lock().unwrap());
}

#[tokio::test]
async fn scenario_periodic_task_fires_immediately() {
    let task: wardenlib::config::periodic::PeriodicTaskConfig = serde_yaml::from_str(
        "name: ip\nfunction_reference: ip_payload\ninterval_seconds: 3600\nrun_immediately: true\ntopic: test/ip\n",
    )
    .unwrap();

    let mut helpers = HelperRegistry::new();
    helpers.register("ip_payload", Arc::new(|_input: &wardenlib::HelperInput| HelperOutcome::Keep(ContextValue::Text("192.0.2.1".to_string()))));
    let helpers = Arc::new(helpers);

    let mut scheduler = PeriodicScheduler::new().await.unwrap();
    let (tick_tx, mut tick_rx) = mpsc::channel(8);
    scheduler.schedule(&task, helpers, tick_tx).await.unwrap();
    scheduler.start().await.unwrap();

    let tick = tokio::time::timeout(Duration::from_millis(200), tick_rx.recv())
        .await
        .expect("immediate tick should fire well within 200ms")
        .expect("channel should yield a tick");

    assert_eq!("test/ip", tick.message.topic);
    assert_eq!(b"192.0.2.1".to_vec(), tick.message.payload);

    scheduler.shutdown().await.unwrap();
}

/// A task whose tick is still "running" must skip the next due tick rather
/// than queue it, observable here as the serialization guard never letting
/// two ticks run concurrently for the same task.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_periodic_serializes_ticks() {
    let task: wardenlib::config::periodic::PeriodicTaskConfig = serde_yaml::from_str(
        "name: slow\nfunction_reference: slow_fn\ninterval_seconds: 1\nrun_immediately: true\n",
    )
    .unwrap();

    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));
    let concurrent_for_helper = concurrent.clone();
    let max_for_helper = max_concurrent.clone();

    let mut helpers = HelperRegistry::new();
    helpers.register(
        "slow_fn",
        Arc::new(move |_input: &wardenlib::HelperInput| {
            let now = concurrent_for_helper.fetch_add(1, Ordering::SeqCst) + 1;
            max_for_helper.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            concurrent_for_helper.fetch_sub(1, Ordering::SeqCst);
            HelperOutcome::Keep(ContextValue::Text("tick".to_string()))
        }),
    );

    let mut scheduler = PeriodicScheduler::new().await.unwrap();
    let (tick_tx, mut tick_rx) = mpsc::channel(8);
    scheduler.schedule(&task, Arc::new(helpers), tick_tx).await.unwrap();
    scheduler.start().await.unwrap();

    for _ in 0..2 {
        let _ = tokio::time::timeout(Duration::from_millis(1500), tick_rx.recv()).await;
    }
    scheduler.shutdown().await.unwrap();

    assert_eq!(1, max_concurrent.load(Ordering::SeqCst));
}
