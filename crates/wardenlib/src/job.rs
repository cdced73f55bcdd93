use crate::context::TransformContext;
use crate::target::Target;
use crate::value::ContextValue;

/// A unit of work placed on a dispatch queue. Owned exclusively by the
/// queue until its worker acknowledges completion or failure.
#[derive(Clone, Debug)]
pub struct Job {
    pub target: Target,
    pub title: Option<String>,
    pub body: String,
    pub context: TransformContext,
    pub priority: Option<i32>,
    pub attempt_count: u32,
    pub topic: String,
    pub payload: Vec<u8>,
    /// The declared parameter sequence for this target
    /// (`ServiceConfig.targets[target.name]`), handed to the plugin
    /// verbatim.
    pub target_parameters: Vec<ContextValue>,
    /// Per-route override of the global retry limit; `None` falls back to
    /// `GlobalDefaults::retry_limit` at dispatch time.
    pub retry_limit: Option<u32>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: Target,
        title: Option<String>,
        body: String,
        context: TransformContext,
        priority: Option<i32>,
        topic: String,
        payload: Vec<u8>,
        target_parameters: Vec<ContextValue>,
        retry_limit: Option<u32>,
    ) -> Self {
        Self {
            target,
            title,
            body,
            context,
            priority,
            attempt_count: 0,
            topic,
            payload,
            target_parameters,
            retry_limit,
        }
    }
}
