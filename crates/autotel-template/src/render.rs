use std::collections::{BTreeMap, BTreeSet};

use autotel_domain::{
    Confidence, ConfigManifest, GeneratedConfig, ServiceInfo, ServiceKind, PROCESSOR_ORDER,
};
use tracing::debug;

use crate::error::RenderError;
use crate::store::{integration_for, Template, EXPORTER, HOSTMETRICS, PROCESSORS};
use crate::vars::{common_env, integration_env, VariableEnv};

/// Renders a complete collector configuration from discovery results and an
/// optional verified manifest. Pure CPU and synchronous: identical inputs
/// produce byte-identical output.
#[derive(Debug, Default, Clone)]
pub struct Renderer {
    /// Lowest-precedence variables supplied by the agent itself
    /// (SERVICE_NAME, ENVIRONMENT, HOST_ID, …).
    base_variables: BTreeMap<String, String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_variables(base_variables: BTreeMap<String, String>) -> Self {
        Renderer { base_variables }
    }

    pub fn set_base_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.base_variables.insert(key.into(), value.into());
    }

    pub fn render(
        &self,
        services: &[ServiceInfo],
        manifest: Option<&ConfigManifest>,
    ) -> Result<GeneratedConfig, RenderError> {
        let selected = select_integrations(services, manifest);

        let mut templates_used = Vec::new();
        let mut required = BTreeSet::new();

        // Receivers: host metrics baseline first, then integrations sorted by
        // kind so the byte stream is stable regardless of discovery order.
        let env = common_env(&self.base_variables, manifest);
        let mut receivers = String::new();
        let mut receiver_ids = Vec::new();

        let hostmetrics = substitute(&HOSTMETRICS, &env, &mut required)?;
        push_fragment(&mut receivers, &hostmetrics);
        receiver_ids.push(HOSTMETRICS.receiver_id.unwrap_or_default());
        templates_used.push(HOSTMETRICS.name.to_string());

        for (kind, service) in &selected {
            let template = match integration_for(*kind) {
                Some(t) => t,
                None => continue,
            };
            let env = integration_env(&self.base_variables, *service, *kind, manifest);
            let rendered = substitute(template, &env, &mut required)?;
            push_fragment(&mut receivers, &rendered);
            if let Some(id) = template.receiver_id {
                receiver_ids.push(id);
            }
            templates_used.push(template.name.to_string());
            debug!(integration = %kind, "rendered integration template");
        }

        let processors = substitute(&PROCESSORS, &env, &mut required)?;
        templates_used.push(PROCESSORS.name.to_string());

        let exporter = substitute(&EXPORTER, &env, &mut required)?;
        templates_used.push(EXPORTER.name.to_string());

        // Canonical assembly order: receivers, processors, exporters,
        // service/pipelines.
        let mut doc = String::from("# Generated by autotel — do not edit\n");
        doc.push_str("receivers:\n");
        doc.push_str(&receivers);
        doc.push_str("processors:\n");
        push_fragment(&mut doc, &processors);
        doc.push_str("exporters:\n");
        push_fragment(&mut doc, &exporter);
        doc.push_str("service:\n  pipelines:\n    metrics:\n");
        doc.push_str(&format!("      receivers: [{}]\n", receiver_ids.join(", ")));
        doc.push_str(&format!("      processors: [{}]\n", PROCESSOR_ORDER.join(", ")));
        doc.push_str("      exporters: [otlp]\n");

        Ok(GeneratedConfig::new(
            doc.into_bytes(),
            templates_used,
            required.into_iter().collect(),
        ))
    }
}

/// Which integrations to include: every service at MEDIUM confidence or
/// better, unless the manifest disables it; LOW services only when the
/// manifest explicitly enables them; manifest-enabled integrations with no
/// discovered service render against template defaults.
fn select_integrations<'a>(
    services: &'a [ServiceInfo],
    manifest: Option<&ConfigManifest>,
) -> BTreeMap<ServiceKind, Option<&'a ServiceInfo>> {
    let mut selected: BTreeMap<ServiceKind, Option<&ServiceInfo>> = BTreeMap::new();

    for service in services {
        let instruction = manifest.and_then(|m| m.integration(service.kind));
        let include = match instruction {
            Some(i) => i.enabled,
            None => service.confidence >= Confidence::Medium,
        };
        if include {
            selected.entry(service.kind).or_insert(Some(service));
        }
    }

    if let Some(manifest) = manifest {
        for integration in &manifest.integrations {
            if integration.enabled {
                selected.entry(integration.kind).or_insert(None);
            }
        }
    }

    selected
}

/// Indent a rendered fragment two spaces under its section header.
fn push_fragment(doc: &mut String, fragment: &str) {
    for line in fragment.lines() {
        if line.is_empty() {
            doc.push('\n');
        } else {
            doc.push_str("  ");
            doc.push_str(line);
            doc.push('\n');
        }
    }
}

/// Substitute `${VAR}` and `${VAR:default}` placeholders. `${env:NAME}`
/// passthroughs are left verbatim for the collector to resolve; their names
/// are collected into `required` so callers know which secrets the config
/// expects. Cleartext secret values never enter the rendered bytes.
fn substitute(
    template: &Template,
    env: &VariableEnv,
    required: &mut BTreeSet<String>,
) -> Result<String, RenderError> {
    let body = template.body;
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(RenderError::UnterminatedPlaceholder { template: template.name.into() });
        };
        let inner = &after[..end];

        if let Some(name) = inner.strip_prefix("env:") {
            required.insert(name.to_string());
            out.push_str("${");
            out.push_str(inner);
            out.push('}');
        } else {
            let (name, default) = match inner.split_once(':') {
                Some((n, d)) => (n, Some(d)),
                None => (inner, None),
            };
            match env.get(name).or(default) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(RenderError::MissingVariable {
                        template: template.name.into(),
                        variable: name.into(),
                    })
                }
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
