use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::job::Job;
use crate::plugin::{Service, ServiceContext, ServiceError};

/// Appends (or overwrites) a target file with the Job's body, generalizing
/// `output/file.rs`'s `OutputTargetFile` (the body was not present in the
/// retrieved pack; behavior here follows its config struct: `path`,
/// `overwrite`, `prepend`, `append`). The path comes from the target's
/// first declared parameter so one `file` service can fan out to many
/// files, one per target name.
pub struct FileService;

#[async_trait]
impl Service for FileService {
    async fn init(&self, _context: &ServiceContext) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn deliver(&self, context: &ServiceContext, job: &Job) -> bool {
        let Some(path) = job.target_parameters.first().and_then(|v| v.as_str()) else {
            tracing::error!(service = %context.service_name, target = %job.target, "file target has no path parameter");
            return false;
        };

        let overwrite = context
            .option("overwrite")
            .map(|v| v.is_truthy())
            .unwrap_or(false);
        let prepend = context.option("prepend").and_then(|v| v.as_str());
        let append = context.option("append").and_then(|v| v.as_str());

        let mut contents = String::new();
        if let Some(prefix) = prepend {
            contents.push_str(prefix);
        }
        contents.push_str(&job.body);
        if let Some(suffix) = append {
            contents.push_str(suffix);
        }
        contents.push('\n');

        let opened = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(!overwrite)
            .truncate(overwrite)
            .open(path)
            .await;

        match opened {
            Ok(mut file) => file.write_all(contents.as_bytes()).await.is_ok(),
            Err(error) => {
                tracing::error!(service = %context.service_name, path, %error, "could not open output file");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransformContext;
    use crate::target::Target;
    use crate::value::ContextValue;
    use indexmap::IndexMap;

    #[tokio::test]
    async fn writes_body_to_target_path() {
        let dir = std::env::temp_dir().join(format!("warden-file-plugin-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("out.txt");

        let service = FileService;
        let context = ServiceContext {
            service_name: "file".to_string(),
            options: IndexMap::new(),
            engine_version: "test",
        };
        let job = Job::new(
            Target::new("file", "f01"),
            None,
            "hello world".to_string(),
            TransformContext::empty("t"),
            None,
            "t".to_string(),
            Vec::new(),
            vec![ContextValue::Text(path.to_string_lossy().to_string())],
            None,
        );

        assert!(service.deliver(&context, &job).await);
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!("hello world\n", written);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_path_parameter_fails_without_panic() {
        let service = FileService;
        let context = ServiceContext {
            service_name: "file".to_string(),
            options: IndexMap::new(),
            engine_version: "test",
        };
        let job = Job::new(
            Target::new("file", "f01"),
            None,
            "hello".to_string(),
            TransformContext::empty("t"),
            None,
            "t".to_string(),
            Vec::new(),
            Vec::new(),
            None,
        );
        assert!(!service.deliver(&context, &job).await);
    }
}
