use async_trait::async_trait;

use crate::job::Job;
use crate::plugin::{Service, ServiceContext, ServiceError};

/// POSTs a Job's body to a URL. The URL is either the target's first
/// declared parameter or a service-level `url` option, letting one
/// `http` service either fan out to distinct endpoints per target or
/// share a single endpoint for all.
pub struct HttpService {
    client: reqwest::Client,
}

impl HttpService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for HttpService {
    async fn init(&self, _context: &ServiceContext) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn deliver(&self, context: &ServiceContext, job: &Job) -> bool {
        let url = job
            .target_parameters
            .first()
            .and_then(|v| v.as_str())
            .or_else(|| context.option("url").and_then(|v| v.as_str()));

        let Some(url) = url else {
            tracing::error!(service = %context.service_name, target = %job.target, "http target has no url parameter or service-level url option");
            return false;
        };

        match self.client.post(url).body(job.body.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::warn!(service = %context.service_name, url, %error, "http delivery failed");
                false
            }
        }
    }
}
