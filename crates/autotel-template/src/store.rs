use autotel_domain::ServiceKind;

/// One embedded template document. `receiver_id` is the top-level key the
/// fragment contributes to the receivers section, used when assembling the
/// service pipelines.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    pub kind: Option<ServiceKind>,
    pub receiver_id: Option<&'static str>,
    pub body: &'static str,
}

/// Common fragments included in every rendered configuration.
pub const HOSTMETRICS: Template = Template {
    name: "common/hostmetrics",
    kind: None,
    receiver_id: Some("hostmetrics"),
    body: include_str!("../templates/common/hostmetrics.yaml"),
};

pub const PROCESSORS: Template = Template {
    name: "common/processors",
    kind: None,
    receiver_id: None,
    body: include_str!("../templates/common/processors.yaml"),
};

pub const EXPORTER: Template = Template {
    name: "common/exporter",
    kind: None,
    receiver_id: None,
    body: include_str!("../templates/common/exporter.yaml"),
};

/// Integration templates, one per detectable service kind. Adding a service
/// type is adding a file here plus a pattern-table entry in discovery.
pub const INTEGRATIONS: &[Template] = &[
    Template {
        name: "integrations/mysql",
        kind: Some(ServiceKind::Mysql),
        receiver_id: Some("mysql"),
        body: include_str!("../templates/integrations/mysql.yaml"),
    },
    Template {
        name: "integrations/postgresql",
        kind: Some(ServiceKind::Postgresql),
        receiver_id: Some("postgresql"),
        body: include_str!("../templates/integrations/postgresql.yaml"),
    },
    Template {
        name: "integrations/redis",
        kind: Some(ServiceKind::Redis),
        receiver_id: Some("redis"),
        body: include_str!("../templates/integrations/redis.yaml"),
    },
    Template {
        name: "integrations/nginx",
        kind: Some(ServiceKind::Nginx),
        receiver_id: Some("nginx"),
        body: include_str!("../templates/integrations/nginx.yaml"),
    },
    Template {
        name: "integrations/apache",
        kind: Some(ServiceKind::Apache),
        receiver_id: Some("apache"),
        body: include_str!("../templates/integrations/apache.yaml"),
    },
    Template {
        name: "integrations/mongodb",
        kind: Some(ServiceKind::Mongodb),
        receiver_id: Some("mongodb"),
        body: include_str!("../templates/integrations/mongodb.yaml"),
    },
    Template {
        name: "integrations/elasticsearch",
        kind: Some(ServiceKind::Elasticsearch),
        receiver_id: Some("elasticsearch"),
        body: include_str!("../templates/integrations/elasticsearch.yaml"),
    },
    Template {
        name: "integrations/rabbitmq",
        kind: Some(ServiceKind::Rabbitmq),
        receiver_id: Some("rabbitmq"),
        body: include_str!("../templates/integrations/rabbitmq.yaml"),
    },
    Template {
        name: "integrations/memcached",
        kind: Some(ServiceKind::Memcached),
        receiver_id: Some("memcached"),
        body: include_str!("../templates/integrations/memcached.yaml"),
    },
    Template {
        name: "integrations/kafka",
        kind: Some(ServiceKind::Kafka),
        receiver_id: Some("kafka"),
        body: include_str!("../templates/integrations/kafka.yaml"),
    },
];

pub fn integration_for(kind: ServiceKind) -> Option<&'static Template> {
    INTEGRATIONS.iter().find(|t| t.kind == Some(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_service_kind_has_an_integration_template() {
        for kind in ServiceKind::ALL {
            let template = integration_for(kind);
            assert!(template.is_some(), "{kind} has no integration template");
            assert!(template.unwrap().receiver_id.is_some());
        }
    }

    #[test]
    fn templates_are_nonempty_yaml_fragments() {
        for t in INTEGRATIONS.iter().chain([&HOSTMETRICS, &PROCESSORS, &EXPORTER]) {
            assert!(!t.body.trim().is_empty(), "{} is empty", t.name);
        }
    }
}
