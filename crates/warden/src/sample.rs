/// A runnable starting point covering every top-level configuration
/// section.
pub const SAMPLE_CONFIG: &str = r#"# Sample warden configuration.

defaults:
  ignore_retained: false
  queue_capacity: 256
  retry_limit: 1
  retry_backoff_ms: 500
  shutdown_grace_period_secs: 10
  strict_service_references: false

broker:
  host: localhost
  port: 1883
  client_id: warden
  keep_alive_secs: 5

services:
  log:
    kind: log
    targets:
      info: []
      warn: []
      crit: []
  file:
    kind: file
    targets:
      archive: ["/var/log/warden/archive.log"]
    options:
      overwrite: false

routes:
  - name: hello
    topic_pattern: "hello/1"
    targets_spec:
      type: static
      targets: ["log:info"]
    format_spec:
      type: template
      template: "{name}: {number}"

  - name: dynamic-loglevel
    topic_pattern: "test/dyn"
    targets_spec:
      type: template
      template: "log:{loglevel}"

failover:
  targets: ["file:archive"]

periodic:
  - name: heartbeat
    function_reference: heartbeat_payload
    interval_seconds: 30
    run_immediately: true
    topic: "_periodic/heartbeat"
    targets: ["log:info"]
"#;

/// A starting point for the compiled-in helper table: documentation
/// showing the shape a helper closure must have, not something `warden`
/// loads at runtime. Copy a function into `helpers_builtin.rs` and
/// register it under the name used in
/// `filter_fn`/`datamap_fn`/`alldata_fn`/`format_spec`/`targets_spec`.
pub const SAMPLE_HELPERS: &str = r#"// Sample helper functions for warden.
//
// Register each one in `helpers_builtin::builtin_helpers()` under the name
// used by a route's filter_fn / datamap_fn / alldata_fn / format_spec
// (function form) / targets_spec (computed form).
//
// fn drop_below_threshold(input: &HelperInput) -> HelperOutcome {
//     match input.context.get("value") {
//         Some(ContextValue::Number(value)) if *value < 10.0 => HelperOutcome::Keep(ContextValue::Bool(true)),
//         _ => HelperOutcome::Keep(ContextValue::Bool(false)),
//     }
// }
//
// fn enrich_with_hostname(input: &HelperInput) -> HelperOutcome {
//     let mut map = IndexMap::new();
//     map.insert("hostname".to_string(), ContextValue::Text(hostname()));
//     HelperOutcome::Keep(ContextValue::Map(map))
// }
//
// fn loud_targets(input: &HelperInput) -> HelperOutcome {
//     HelperOutcome::Keep(ContextValue::List(vec![
//         ContextValue::Text("log:crit".to_string()),
//         ContextValue::Text("file:archive".to_string()),
//     ]))
// }
"#;
