use autotel_domain::ServiceKind;

/// Executable basenames that identify a service process.
pub const PROCESS_PATTERNS: &[(&str, ServiceKind)] = &[
    ("mysqld", ServiceKind::Mysql),
    ("mariadbd", ServiceKind::Mysql),
    ("postgres", ServiceKind::Postgresql),
    ("postmaster", ServiceKind::Postgresql),
    ("redis-server", ServiceKind::Redis),
    ("nginx", ServiceKind::Nginx),
    ("httpd", ServiceKind::Apache),
    ("apache2", ServiceKind::Apache),
    ("mongod", ServiceKind::Mongodb),
    ("elasticsearch", ServiceKind::Elasticsearch),
    ("rabbitmq-server", ServiceKind::Rabbitmq),
    ("beam.smp", ServiceKind::Rabbitmq),
    ("memcached", ServiceKind::Memcached),
    ("kafka", ServiceKind::Kafka),
];

/// Well-known listening ports. A port match contributes a candidate endpoint.
pub const PORT_PATTERNS: &[(u16, ServiceKind)] = &[
    (3306, ServiceKind::Mysql),
    (5432, ServiceKind::Postgresql),
    (6379, ServiceKind::Redis),
    (80, ServiceKind::Nginx),
    (443, ServiceKind::Nginx),
    (8080, ServiceKind::Apache),
    (27017, ServiceKind::Mongodb),
    (9200, ServiceKind::Elasticsearch),
    (9300, ServiceKind::Elasticsearch),
    (5672, ServiceKind::Rabbitmq),
    (15672, ServiceKind::Rabbitmq),
    (11211, ServiceKind::Memcached),
    (9092, ServiceKind::Kafka),
];

/// Well-known configuration paths probed for existence. Content is never
/// parsed here.
pub const CONFIG_PATHS: &[(ServiceKind, &[&str])] = &[
    (ServiceKind::Mysql, &["/etc/mysql", "/etc/my.cnf", "/etc/mysql/my.cnf"]),
    (
        ServiceKind::Postgresql,
        &["/etc/postgresql", "/var/lib/pgsql/data/postgresql.conf"],
    ),
    (ServiceKind::Redis, &["/etc/redis", "/etc/redis.conf", "/etc/redis/redis.conf"]),
    (ServiceKind::Nginx, &["/etc/nginx", "/etc/nginx/nginx.conf"]),
    (
        ServiceKind::Apache,
        &["/etc/apache2", "/etc/httpd", "/etc/apache2/apache2.conf"],
    ),
    (ServiceKind::Mongodb, &["/etc/mongod.conf", "/etc/mongodb.conf"]),
    (ServiceKind::Elasticsearch, &["/etc/elasticsearch"]),
    (ServiceKind::Rabbitmq, &["/etc/rabbitmq"]),
    (ServiceKind::Memcached, &["/etc/memcached.conf"]),
    (ServiceKind::Kafka, &["/etc/kafka", "/opt/kafka/config"]),
];

/// Package names queried against the system package database.
pub const PACKAGE_PATTERNS: &[(ServiceKind, &[&str])] = &[
    (ServiceKind::Mysql, &["mysql-server", "mysql-community-server", "mariadb-server"]),
    (ServiceKind::Postgresql, &["postgresql", "postgresql-server"]),
    (ServiceKind::Redis, &["redis-server", "redis"]),
    (ServiceKind::Nginx, &["nginx"]),
    (ServiceKind::Apache, &["apache2", "httpd"]),
    (ServiceKind::Mongodb, &["mongodb-org-server", "mongodb-server"]),
    (ServiceKind::Elasticsearch, &["elasticsearch"]),
    (ServiceKind::Rabbitmq, &["rabbitmq-server"]),
    (ServiceKind::Memcached, &["memcached"]),
    (ServiceKind::Kafka, &["kafka"]),
];

/// Default port a service listens on when discovery saw no endpoint for it.
pub fn default_port(kind: ServiceKind) -> u16 {
    match kind {
        ServiceKind::Mysql => 3306,
        ServiceKind::Postgresql => 5432,
        ServiceKind::Redis => 6379,
        ServiceKind::Nginx => 80,
        ServiceKind::Apache => 8080,
        ServiceKind::Mongodb => 27017,
        ServiceKind::Elasticsearch => 9200,
        ServiceKind::Rabbitmq => 5672,
        ServiceKind::Memcached => 11211,
        ServiceKind::Kafka => 9092,
    }
}

pub fn kind_for_process(basename: &str) -> Option<ServiceKind> {
    PROCESS_PATTERNS
        .iter()
        .find(|(pattern, _)| *pattern == basename)
        .map(|(_, kind)| *kind)
}

pub fn kind_for_port(port: u16) -> Option<ServiceKind> {
    PORT_PATTERNS.iter().find(|(p, _)| *p == port).map(|(_, kind)| *kind)
}

pub fn config_paths_for(kind: ServiceKind) -> &'static [&'static str] {
    CONFIG_PATHS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, paths)| *paths)
        .unwrap_or(&[])
}

pub fn packages_for(kind: ServiceKind) -> &'static [&'static str] {
    PACKAGE_PATTERNS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}
