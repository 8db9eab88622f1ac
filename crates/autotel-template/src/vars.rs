use std::collections::BTreeMap;

use autotel_domain::{ConfigManifest, ServiceInfo, ServiceKind};

/// The substitution environment for one template, assembled in order of
/// increasing precedence: discovery values < manifest global variables <
/// manifest per-integration variables. Template inline defaults sit below
/// all of these; process-environment secrets are never substituted, only
/// passed through by name.
#[derive(Debug, Default, Clone)]
pub struct VariableEnv {
    values: BTreeMap<String, String>,
}

impl VariableEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn merge(&mut self, other: &BTreeMap<String, String>) {
        for (k, v) in other {
            self.values.insert(k.clone(), v.clone());
        }
    }
}

/// Build the environment for one integration template.
pub fn integration_env(
    base: &BTreeMap<String, String>,
    service: Option<&ServiceInfo>,
    kind: ServiceKind,
    manifest: Option<&ConfigManifest>,
) -> VariableEnv {
    let mut env = VariableEnv::new();
    env.merge(base);

    // Discovery values: the primary endpoint under <KIND>_ENDPOINT.
    if let Some(endpoint) = service.and_then(|s| s.primary_endpoint()) {
        env.set(endpoint_var(kind), endpoint.to_string());
    }
    if let Some(version) = service.and_then(|s| s.version.as_deref()) {
        env.set(format!("{}_VERSION", kind_var(kind)), version);
    }

    if let Some(manifest) = manifest {
        env.merge(&manifest.global_variables);
        if let Some(integration) = manifest.integration(kind) {
            env.merge(&integration.variables);
        }
    }
    env
}

/// Environment for the common templates: base variables plus manifest
/// globals.
pub fn common_env(base: &BTreeMap<String, String>, manifest: Option<&ConfigManifest>) -> VariableEnv {
    let mut env = VariableEnv::new();
    env.merge(base);
    if let Some(manifest) = manifest {
        env.merge(&manifest.global_variables);
    }
    env
}

fn kind_var(kind: ServiceKind) -> String {
    kind.as_str().to_ascii_uppercase()
}

pub fn endpoint_var(kind: ServiceKind) -> String {
    format!("{}_ENDPOINT", kind_var(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotel_domain::{DiscoverySignal, Endpoint};
    use chrono::Utc;

    #[test]
    fn precedence_orders_discovery_below_manifest() {
        let mut svc = ServiceInfo::new(ServiceKind::Mysql, DiscoverySignal::Port);
        svc.add_endpoint(Endpoint::tcp("localhost", 3306));

        let manifest = ConfigManifest {
            version: "1".into(),
            integrations: vec![autotel_domain::ManifestIntegration {
                kind: ServiceKind::Mysql,
                enabled: true,
                variables: [("MYSQL_ENDPOINT".to_string(), "db.internal:3306".to_string())]
                    .into_iter()
                    .collect(),
            }],
            global_variables: [("MYSQL_ENDPOINT".to_string(), "global:3306".to_string())]
                .into_iter()
                .collect(),
            signature: String::new(),
            signed_at: Utc::now(),
            issuer: "test".into(),
        };

        let base = BTreeMap::new();
        let env = integration_env(&base, Some(&svc), ServiceKind::Mysql, Some(&manifest));
        // per-integration beats global beats discovery
        assert_eq!(env.get("MYSQL_ENDPOINT"), Some("db.internal:3306"));
    }

    #[test]
    fn discovery_endpoint_used_when_manifest_silent() {
        let mut svc = ServiceInfo::new(ServiceKind::Redis, DiscoverySignal::Port);
        svc.add_endpoint(Endpoint::tcp("localhost", 6379));

        let base = BTreeMap::new();
        let env = integration_env(&base, Some(&svc), ServiceKind::Redis, None);
        assert_eq!(env.get("REDIS_ENDPOINT"), Some("localhost:6379"));
    }
}
