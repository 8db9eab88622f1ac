use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown service kind: {0}")]
    UnknownServiceKind(String),

    #[error("service has no discovery signals")]
    EmptyDiscoverySignals,

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("invalid config version: {0}")]
    InvalidConfigVersion(String),
}
