use async_trait::async_trait;

use crate::job::Job;
use crate::plugin::{Service, ServiceContext, ServiceError};

/// Writes a Job's body to the `tracing` log, the target name selecting the
/// level. Generalizes `output/console.rs`'s `ConsoleOutput::output_topic`
/// (which always printed to stdout at a fixed "level") into a proper
/// leveled sink.
pub struct LogService;

#[async_trait]
impl Service for LogService {
    async fn init(&self, _context: &ServiceContext) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn deliver(&self, context: &ServiceContext, job: &Job) -> bool {
        match job.target.name.as_str() {
            "error" | "crit" => {
                tracing::error!(service = %context.service_name, topic = %job.topic, "{}", job.body)
            }
            "warn" | "warning" => {
                tracing::warn!(service = %context.service_name, topic = %job.topic, "{}", job.body)
            }
            "debug" => {
                tracing::debug!(service = %context.service_name, topic = %job.topic, "{}", job.body)
            }
            _ => {
                tracing::info!(service = %context.service_name, topic = %job.topic, "{}", job.body)
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransformContext;
    use crate::target::Target;
    use indexmap::IndexMap;

    #[tokio::test]
    async fn always_delivers() {
        let service = LogService;
        let context = ServiceContext {
            service_name: "log".to_string(),
            options: IndexMap::new(),
            engine_version: "test",
        };
        let job = Job::new(
            Target::new("log", "info"),
            None,
            "hello".to_string(),
            TransformContext::empty("t"),
            None,
            "t".to_string(),
            Vec::new(),
            Vec::new(),
            None,
        );
        assert!(service.deliver(&context, &job).await);
    }
}
