use crate::config::route::{FormatSpec, Route};
use crate::config::GlobalDefaults;
use crate::context::{TransformContext, TimeZoneMode};
use crate::helpers::{HelperInput, HelperOutcome, HelperRegistry};
use crate::job::Job;
use crate::message::Message;
use crate::registry::ServiceRegistry;
use crate::target_expand::expand_targets;
use crate::value::ContextValue;

/// `process(route, message) -> sequence<Job>`, the single public
/// operation of the Transform Pipeline. Every stage may short-circuit to
/// zero Jobs; side-effect-free up to the point a Job is produced.
pub struct Pipeline {
    pub time_zone: TimeZoneMode,
}

impl Pipeline {
    pub fn new(time_zone: TimeZoneMode) -> Self {
        Self { time_zone }
    }

    pub fn process(
        &self,
        route: &Route,
        message: &Message,
        defaults: &GlobalDefaults,
        helpers: &HelperRegistry,
        registry: &ServiceRegistry,
    ) -> Vec<Job> {
        // Stage 1: retained filter.
        if message.retained && route.ignore_retained(defaults.ignore_retained) {
            return Vec::new();
        }

        // Stage 2: base context.
        let mut context = TransformContext::base(route, message, self.time_zone);

        // Stage 3: payload decode. Never fatal.
        context.merge_decoded_payload();

        // Stage 4: filter_fn.
        if let Some(filter_fn) = &route.filter_fn {
            let input = helper_input(route, message, &context, &[]);
            match helpers.call(filter_fn, &input) {
                HelperOutcome::Keep(value) if value.is_truthy() => return Vec::new(),
                HelperOutcome::Drop => return Vec::new(),
                HelperOutcome::Error(detail) => {
                    // Fail-safe: a failed filter_fn never drops.
                    tracing::warn!(route = %route.name, helper = %filter_fn, error = %detail, "filter_fn failed, delivering (fail-safe)");
                }
                HelperOutcome::Keep(_) => {}
            }
        }

        // Stage 5: datamap_fn.
        if let Some(datamap_fn) = &route.datamap_fn {
            let input = helper_input(route, message, &context, &[]);
            let outcome = helpers.call(datamap_fn, &input);
            apply_map_outcome(&mut context, outcome, route, datamap_fn);
        }

        // Stage 7: format. (Stage 6, alldata_fn, runs per-target below.)
        let Some(body) = self.format(route, &context, helpers) else {
            return Vec::new();
        };

        // Stage 8: target expansion, one Job per target.
        let targets = expand_targets(route, &context, helpers, registry);
        if targets.is_empty() {
            tracing::warn!(route = %route.name, "no valid targets resolved, dropping message");
            return Vec::new();
        }

        let mut jobs = Vec::with_capacity(targets.len());
        for target in targets {
            let mut job_context = context.clone();
            if let Some(alldata_fn) = &route.alldata_fn {
                let input = helper_input(route, message, &job_context, std::slice::from_ref(&target));
                let outcome = helpers.call(alldata_fn, &input);
                apply_map_outcome(&mut job_context, outcome, route, alldata_fn);
            }

            let target_parameters = registry.target_parameters(&target);
            jobs.push(Job::new(
                target,
                None,
                body.clone(),
                job_context,
                route.priority,
                message.topic.clone(),
                message.payload.clone(),
                target_parameters,
                route.retry_limit,
            ));
        }
        jobs
    }

    fn format(&self, route: &Route, context: &TransformContext, helpers: &HelperRegistry) -> Option<String> {
        match &route.format_spec {
            None => Some(context.payload_as_text()),
            Some(FormatSpec::Template { template }) => Some(context.render_template(template)),
            Some(FormatSpec::Function { function }) => {
                let input = HelperInput {
                    topic: &context.topic,
                    payload: &context.payload,
                    section_name: &route.name,
                    context,
                    topic_targets: &[],
                };
                match helpers.call(function, &input) {
                    HelperOutcome::Keep(value) => Some(value.to_string()),
                    HelperOutcome::Drop => None,
                    HelperOutcome::Error(detail) => {
                        tracing::warn!(route = %route.name, helper = %function, error = %detail, "format function failed, dropping message for this route");
                        None
                    }
                }
            }
        }
    }
}

fn helper_input<'a>(
    route: &'a Route,
    message: &'a Message,
    context: &'a TransformContext,
    topic_targets: &'a [crate::target::Target],
) -> HelperInput<'a> {
    HelperInput {
        topic: &message.topic,
        payload: &context.payload,
        section_name: &route.name,
        context,
        topic_targets,
    }
}

/// Shared "merge a map-returning helper's outcome" behavior for
/// `datamap_fn` and `alldata_fn`: any failure is logged and the best
/// partial context carries on.
fn apply_map_outcome(
    context: &mut TransformContext,
    outcome: HelperOutcome,
    route: &Route,
    helper_name: &str,
) {
    match outcome {
        HelperOutcome::Keep(ContextValue::Map(map)) => context.merge(map),
        HelperOutcome::Keep(_) => {
            tracing::warn!(route = %route.name, helper = helper_name, "helper did not return a map, ignoring its result");
        }
        HelperOutcome::Drop => {}
        HelperOutcome::Error(detail) => {
            tracing::warn!(route = %route.name, helper = helper_name, error = %detail, "helper failed, continuing with partial context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::QoS;
    use crate::config::service::ServiceConfig;
    use indexmap::IndexMap;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn route_with(yaml: &str) -> Route {
        serde_yaml::from_str(yaml).unwrap()
    }

    async fn registry_with(service: &str, target: &str) -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry.register_plugin("log", Arc::new(crate::plugins::log::LogService));
        let mut targets = IndexMap::new();
        targets.insert(target.to_string(), Vec::new());
        let mut services = HashMap::new();
        services.insert(
            service.to_string(),
            ServiceConfig {
                kind: "log".to_string(),
                targets,
                options: IndexMap::new(),
            },
        );
        registry.load(services).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn static_route_produces_one_job_with_formatted_body() {
        let route = route_with(
            "name: hello\ntopic_pattern: hello/1\ntargets_spec:\n  type: static\n  targets: [\"log:info\"]\nformat_spec:\n  type: template\n  template: \"{name}: {number}\"\n",
        );
        let message = Message::new("hello/1", br#"{"name":"Alice","number":42}"#.to_vec(), QoS::AtMostOnce, false);
        let registry = registry_with("log", "info").await;
        let helpers = HelperRegistry::new();
        let defaults = GlobalDefaults::default();
        let pipeline = Pipeline::new(TimeZoneMode::Local);

        let jobs = pipeline.process(&route, &message, &defaults, &helpers, &registry);
        assert_eq!(1, jobs.len());
        assert_eq!("Alice: 42", jobs[0].body);
        assert_eq!("log", jobs[0].target.service);
        assert_eq!("info", jobs[0].target.name);
    }

    #[tokio::test]
    async fn retained_message_dropped_when_route_ignores_retained() {
        let route = route_with(
            "name: r\ntopic_pattern: t\ntargets_spec:\n  type: static\n  targets: [\"log:info\"]\nignore_retained: true\n",
        );
        let message = Message::new("t", b"x".to_vec(), QoS::AtMostOnce, true);
        let registry = registry_with("log", "info").await;
        let helpers = HelperRegistry::new();
        let defaults = GlobalDefaults::default();
        let pipeline = Pipeline::new(TimeZoneMode::Local);

        assert!(pipeline.process(&route, &message, &defaults, &helpers, &registry).is_empty());
    }

    #[tokio::test]
    async fn filter_fn_truthy_drops_message() {
        let route = route_with(
            "name: r\ntopic_pattern: t\ntargets_spec:\n  type: static\n  targets: [\"log:info\"]\nfilter_fn: always_drop\n",
        );
        let message = Message::new("t", b"x".to_vec(), QoS::AtMostOnce, false);
        let registry = registry_with("log", "info").await;
        let mut helpers = HelperRegistry::new();
        helpers.register("always_drop", Arc::new(|_input| HelperOutcome::Keep(ContextValue::Bool(true))));
        let defaults = GlobalDefaults::default();
        let pipeline = Pipeline::new(TimeZoneMode::Local);

        assert!(pipeline.process(&route, &message, &defaults, &helpers, &registry).is_empty());
    }

    #[tokio::test]
    async fn failed_filter_fn_fails_open_and_delivers() {
        let route = route_with(
            "name: r\ntopic_pattern: t\ntargets_spec:\n  type: static\n  targets: [\"log:info\"]\nfilter_fn: boom\n",
        );
        let message = Message::new("t", b"x".to_vec(), QoS::AtMostOnce, false);
        let registry = registry_with("log", "info").await;
        let mut helpers = HelperRegistry::new();
        helpers.register("boom", Arc::new(|_input| HelperOutcome::Error("nope".to_string())));
        let defaults = GlobalDefaults::default();
        let pipeline = Pipeline::new(TimeZoneMode::Local);

        assert_eq!(1, pipeline.process(&route, &message, &defaults, &helpers, &registry).len());
    }

    #[tokio::test]
    async fn fan_out_produces_one_job_per_target() {
        let route = route_with(
            "name: r\ntopic_pattern: t\ntargets_spec:\n  type: static\n  targets: [\"log:info\", \"log:crit\"]\n",
        );
        let message = Message::new("t", b"x".to_vec(), QoS::AtMostOnce, false);
        let mut registry = ServiceRegistry::new();
        registry.register_plugin("log", Arc::new(crate::plugins::log::LogService));
        let mut targets = IndexMap::new();
        targets.insert("info".to_string(), Vec::new());
        targets.insert("crit".to_string(), Vec::new());
        let mut services = HashMap::new();
        services.insert(
            "log".to_string(),
            ServiceConfig { kind: "log".to_string(), targets, options: IndexMap::new() },
        );
        registry.load(services).await.unwrap();
        let helpers = HelperRegistry::new();

        let defaults = GlobalDefaults::default();
        let pipeline = Pipeline::new(TimeZoneMode::Local);
        let jobs = pipeline.process(&route, &message, &defaults, &helpers, &registry);
        assert_eq!(2, jobs.len());
    }
}
