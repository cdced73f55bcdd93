//! # Warden
//! A message-routing bridge between an MQTT broker and a set of
//! configurable notification backends.
//!
//! Main features:
//! - topic-pattern routing with filter / data-map / format stages
//! - static, templated, or function-computed delivery targets
//! - per-target dispatch queues with retry and failover
//! - periodic tasks that feed synthetic messages into the same pipeline

mod cli;
mod helpers_builtin;
mod sample;

use std::io::Write;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wardenlib::{Engine, EngineConfig, RumqttcBroker, Service, ServiceRegistry, Target};

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_level.as_deref());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("could not start async runtime: {error}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "warden exited with an error");
            ExitCode::from(exit_code_for(&error))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    let is_config_error = error
        .chain()
        .any(|cause| cause.downcast_ref::<wardenlib::ConfigError>().is_some());
    if is_config_error {
        1
    } else {
        2
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run { config_file } => run_daemon(config_file).await,
        Command::SampleConfig { output } => write_sample(output, sample::SAMPLE_CONFIG),
        Command::SampleHelpers { output } => write_sample(output, sample::SAMPLE_HELPERS),
        Command::TestService { config_file, target, body } => {
            test_service(config_file, target, body).await
        }
    }
}

async fn run_daemon(config_file: std::path::PathBuf) -> anyhow::Result<()> {
    let config = EngineConfig::from_yaml_file(&config_file)
        .with_context(|| format!("error while parsing {}", config_file.display()))?;

    info!(routes = config.routes.len(), services = config.services.len(), "configuration loaded");

    let mut registry = ServiceRegistry::new();
    register_reference_plugins(&mut registry);
    registry
        .load(config.services.clone())
        .await
        .with_context(|| "error while initializing services")?;

    let broker: Arc<dyn wardenlib::Broker> = Arc::new(RumqttcBroker::new(&config.broker));
    let engine = Engine::new(config, registry, helpers_builtin::builtin_helpers(), broker);

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "could not install ctrl-c handler");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    engine
        .run(shutdown_rx)
        .await
        .with_context(|| "error while running engine")?;

    Ok(())
}

fn write_sample(output: Option<std::path::PathBuf>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("error while writing {}", path.display()))?;
        }
        None => {
            std::io::stdout()
                .write_all(content.as_bytes())
                .with_context(|| "error while writing to stdout")?;
        }
    }
    Ok(())
}

async fn test_service(config_file: std::path::PathBuf, target: String, body: String) -> anyhow::Result<()> {
    let config = EngineConfig::from_yaml_file(&config_file)
        .with_context(|| format!("error while parsing {}", config_file.display()))?;
    let target = Target::from_str(&target)
        .map_err(|_| anyhow::anyhow!("`{target}` is not of the form `service:target`"))?;

    let mut registry = ServiceRegistry::new();
    register_reference_plugins(&mut registry);
    registry
        .load(config.services.clone())
        .await
        .with_context(|| "error while initializing services")?;

    if !registry.is_declared(&target) {
        anyhow::bail!("target `{target}` is not declared in any configured service");
    }

    let target_parameters = registry.target_parameters(&target);
    let job = wardenlib::Job::new(
        target.clone(),
        None,
        body,
        wardenlib::context::TransformContext::empty(target.to_string()),
        None,
        target.to_string(),
        Vec::new(),
        target_parameters,
        None,
    );

    let delivered = registry.dispatch(&target, &job).await;
    if delivered {
        info!(%target, "test delivery succeeded");
        Ok(())
    } else {
        anyhow::bail!("test delivery to `{target}` failed");
    }
}

fn register_reference_plugins(registry: &mut ServiceRegistry) {
    registry.register_plugin("log", Arc::new(wardenlib::plugins::log::LogService) as Arc<dyn Service>);
    registry.register_plugin("file", Arc::new(wardenlib::plugins::file::FileService) as Arc<dyn Service>);
    registry.register_plugin("http", Arc::new(wardenlib::plugins::http::HttpService::new()) as Arc<dyn Service>);
}

fn init_logger(level: Option<&str>) {
    let filter = level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
