use std::time::Duration;

use autotel_domain::PROCESSOR_ORDER;
use serde_yaml::Value;

use crate::error::ValidateError;

const ALLOWED_TOP_LEVEL: [&str; 4] = ["receivers", "processors", "exporters", "service"];

/// Processors that may never be disabled or dropped from the pipeline.
const PROTECTED_PROCESSORS: [&str; 2] = ["security", "enrichment"];

const MAX_BATCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Resource-and-safety rules the orchestrator must not violate regardless of
/// manifest content.
pub fn check(config: &Value) -> Result<(), ValidateError> {
    let root = config.as_mapping().ok_or(ValidateError::Policy {
        rule: "document",
        message: "config root must be a mapping".into(),
    })?;

    // Closed top-level key set.
    for key in root.keys() {
        let name = key.as_str().unwrap_or_default();
        if !ALLOWED_TOP_LEVEL.contains(&name) {
            return Err(ValidateError::Policy {
                rule: "unknown_key",
                message: format!("unknown top-level key '{}'", name),
            });
        }
    }

    let processors = config
        .get("processors")
        .and_then(|p| p.as_mapping())
        .ok_or(ValidateError::Policy {
            rule: "processors",
            message: "processors section missing".into(),
        })?;

    // Memory limit present and positive.
    let limit = processors
        .get("memory_limiter")
        .and_then(|m| m.get("limit_mib"))
        .and_then(|v| v.as_u64())
        .ok_or(ValidateError::Policy {
            rule: "memory_limiter",
            message: "memory_limiter.limit_mib missing or not a positive integer".into(),
        })?;
    if limit == 0 {
        return Err(ValidateError::Policy {
            rule: "memory_limiter",
            message: "memory_limiter.limit_mib must be positive".into(),
        });
    }

    // Batch timeout bounded.
    let timeout = processors
        .get("batch")
        .and_then(|b| b.get("timeout"))
        .and_then(|v| v.as_str())
        .ok_or(ValidateError::Policy {
            rule: "batch",
            message: "batch.timeout missing".into(),
        })?;
    let timeout = parse_duration(timeout).ok_or_else(|| ValidateError::Policy {
        rule: "batch",
        message: format!("batch.timeout '{}' is not a duration", timeout),
    })?;
    if timeout.is_zero() || timeout > MAX_BATCH_TIMEOUT {
        return Err(ValidateError::Policy {
            rule: "batch",
            message: format!("batch.timeout must be within (0, {}s]", MAX_BATCH_TIMEOUT.as_secs()),
        });
    }

    // Security and enrichment cannot be disabled.
    for name in PROTECTED_PROCESSORS {
        if !processors.contains_key(name) {
            return Err(ValidateError::Policy {
                rule: "protected_processor",
                message: format!("processor '{}' must be present", name),
            });
        }
    }

    check_pipelines(config)?;
    check_referenced_paths(config)?;
    Ok(())
}

/// Every pipeline's processor chain must be exactly the fixed order.
fn check_pipelines(config: &Value) -> Result<(), ValidateError> {
    let pipelines = config
        .get("service")
        .and_then(|s| s.get("pipelines"))
        .and_then(|p| p.as_mapping())
        .ok_or(ValidateError::Policy {
            rule: "pipelines",
            message: "service.pipelines missing".into(),
        })?;

    for (name, pipeline) in pipelines {
        let name = name.as_str().unwrap_or_default();
        let processors: Vec<&str> = pipeline
            .get("processors")
            .and_then(|p| p.as_sequence())
            .map(|seq| seq.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        if processors != PROCESSOR_ORDER {
            return Err(ValidateError::Policy {
                rule: "processor_order",
                message: format!(
                    "pipeline '{}' processors must be exactly [{}], got [{}]",
                    name,
                    PROCESSOR_ORDER.join(", "),
                    processors.join(", ")
                ),
            });
        }
    }
    Ok(())
}

/// Filesystem paths referenced by the config must exist and be readable.
fn check_referenced_paths(config: &Value) -> Result<(), ValidateError> {
    let mut paths = Vec::new();
    collect_path_values(config, &mut paths);
    for path in paths {
        if std::fs::metadata(&path).is_err() {
            return Err(ValidateError::Policy {
                rule: "path",
                message: format!("referenced path '{}' does not exist or is unreadable", path),
            });
        }
    }
    Ok(())
}

/// Keys that by convention hold filesystem paths.
fn collect_path_values(value: &Value, out: &mut Vec<String>) {
    const PATH_KEYS: [&str; 5] = ["file", "ca_file", "cert_file", "key_file", "file_path"];
    if let Some(map) = value.as_mapping() {
        for (key, nested) in map {
            let key_name = key.as_str().unwrap_or_default();
            if PATH_KEYS.contains(&key_name) {
                if let Some(path) = nested.as_str() {
                    out.push(path.to_string());
                }
            }
            collect_path_values(nested, out);
        }
    } else if let Some(seq) = value.as_sequence() {
        for nested in seq {
            collect_path_values(nested, out);
        }
    }
}

/// Parse collector-style duration literals: `500ms`, `5s`, `1m`.
fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if let Some(ms) = text.strip_suffix("ms") {
        return ms.parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(s) = text.strip_suffix('s') {
        return s.parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(m) = text.strip_suffix('m') {
        return m.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_doc() -> Value {
        serde_yaml::from_str(
            r#"
receivers:
  hostmetrics: {}
processors:
  memory_limiter:
    limit_mib: 512
  security: {}
  enrichment: {}
  transform: {}
  cardinality_cap: {}
  batch:
    timeout: 5s
exporters:
  otlp: {}
service:
  pipelines:
    metrics:
      receivers: [hostmetrics]
      processors: [memory_limiter, security, enrichment, transform, cardinality_cap, batch]
      exporters: [otlp]
"#,
        )
        .unwrap()
    }

    #[test]
    fn valid_config_passes() {
        check(&valid_doc()).unwrap();
    }

    #[test]
    fn rendered_template_output_passes_policy() {
        let generated = autotel_template::Renderer::new().render(&[], None).unwrap();
        let doc: Value = serde_yaml::from_str(generated.as_str()).unwrap();
        check(&doc).unwrap();
    }

    #[test]
    fn unknown_top_level_key_rejected() {
        let mut doc = valid_doc();
        doc.as_mapping_mut().unwrap().insert(Value::from("extensions"), Value::Null);
        let err = check(&doc).unwrap_err();
        assert!(matches!(err, ValidateError::Policy { rule: "unknown_key", .. }));
    }

    #[test]
    fn zero_memory_limit_rejected() {
        let mut doc = valid_doc();
        doc["processors"]["memory_limiter"]["limit_mib"] = Value::from(0u64);
        assert!(matches!(
            check(&doc).unwrap_err(),
            ValidateError::Policy { rule: "memory_limiter", .. }
        ));
    }

    #[test]
    fn unbounded_batch_timeout_rejected() {
        let mut doc = valid_doc();
        doc["processors"]["batch"]["timeout"] = Value::from("5m");
        assert!(matches!(check(&doc).unwrap_err(), ValidateError::Policy { rule: "batch", .. }));
    }

    #[test]
    fn dropping_security_processor_rejected() {
        let mut doc = valid_doc();
        doc["processors"].as_mapping_mut().unwrap().remove("security");
        assert!(matches!(
            check(&doc).unwrap_err(),
            ValidateError::Policy { rule: "protected_processor", .. }
        ));
    }

    #[test]
    fn wrong_processor_order_rejected() {
        let mut doc = valid_doc();
        doc["service"]["pipelines"]["metrics"]["processors"] = serde_yaml::from_str(
            "[batch, memory_limiter, security, enrichment, transform, cardinality_cap]",
        )
        .unwrap();
        assert!(matches!(
            check(&doc).unwrap_err(),
            ValidateError::Policy { rule: "processor_order", .. }
        ));
    }

    #[test]
    fn missing_referenced_path_rejected() {
        let mut doc = valid_doc();
        doc["exporters"]["otlp"] =
            serde_yaml::from_str("{ca_file: /nonexistent/ca.pem}").unwrap();
        assert!(matches!(check(&doc).unwrap_err(), ValidateError::Policy { rule: "path", .. }));
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("oops"), None);
    }
}
