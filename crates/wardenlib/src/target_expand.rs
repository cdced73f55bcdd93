use std::str::FromStr;

use crate::config::route::{Route, TargetsSpec};
use crate::context::TransformContext;
use crate::helpers::{HelperInput, HelperOutcome, HelperRegistry};
use crate::registry::ServiceRegistry;
use crate::target::Target;
use crate::value::ContextValue;

/// Resolves a route's `targets_spec` to concrete targets. Unknown-target
/// policy is robust throughout: a malformed spec is logged and dropped,
/// never fatal to the message or the engine.
pub fn expand_targets(
    route: &Route,
    context: &TransformContext,
    helpers: &HelperRegistry,
    registry: &ServiceRegistry,
) -> Vec<Target> {
    let raw: Vec<String> = match &route.targets_spec {
        TargetsSpec::Static { targets } => targets.clone(),
        TargetsSpec::Template { template } => vec![context.render_template(template)],
        TargetsSpec::Computed { function } => {
            let input = HelperInput {
                topic: &context.topic,
                payload: &context.payload,
                section_name: &route.name,
                context,
                topic_targets: &[],
            };
            match helpers.call(function, &input) {
                HelperOutcome::Keep(ContextValue::List(values)) => values
                    .iter()
                    .filter_map(ContextValue::as_str)
                    .map(str::to_string)
                    .collect(),
                HelperOutcome::Keep(ContextValue::Text(value)) => vec![value],
                HelperOutcome::Keep(_) => {
                    tracing::warn!(route = %route.name, function, "targets function returned a non-list, non-string value, treating as empty");
                    Vec::new()
                }
                HelperOutcome::Drop => Vec::new(),
                HelperOutcome::Error(detail) => {
                    tracing::warn!(route = %route.name, function, error = %detail, "targets function failed, treating as empty");
                    Vec::new()
                }
            }
        }
    };

    let mut targets = Vec::new();
    for spec in raw {
        match Target::from_str(&spec) {
            Ok(target) if registry.is_declared(&target) => targets.push(target),
            Ok(target) => {
                tracing::warn!(route = %route.name, %target, "target not declared in any service, dropping");
            }
            Err(_) => {
                tracing::warn!(route = %route.name, spec, "malformed target spec, dropping");
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn static_targets_filtered_to_declared() {
        let route = route_with(
            "name: r\ntopic_pattern: t\ntargets_spec:\n  type: static\n  targets: [\"log:info\", \"log:missing\"]\n",
        );
        let registry = registry_with("log", "info").await;
        let helpers = HelperRegistry::new();
        let ctx = TransformContext::empty("t");

        let targets = expand_targets(&route, &ctx, &helpers, &registry);
        assert_eq!(vec![Target::new("log", "info")], targets);
    }

    #[tokio::test]
    async fn template_targets_resolve_against_context() {
        let route = route_with(
            "name: r\ntopic_pattern: t\ntargets_spec:\n  type: template\n  template: \"log:{loglevel}\"\n",
        );
        let registry = registry_with("log", "crit").await;
        let helpers = HelperRegistry::new();
        let mut ctx = TransformContext::empty("t");
        ctx.values.insert("loglevel".to_string(), ContextValue::Text("crit".to_string()));

        assert_eq!(
            vec![Target::new("log", "crit")],
            expand_targets(&route, &ctx, &helpers, &registry)
        );

        ctx.values.insert("loglevel".to_string(), ContextValue::Text("nonesuch".to_string()));
        assert!(expand_targets(&route, &ctx, &helpers, &registry).is_empty());
    }
}
