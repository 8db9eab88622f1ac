pub mod error;
pub mod loader;
pub mod raw;

pub use error::ConfigError;
pub use loader::{
    load, from_env, AgentConfig, ApiAuth, ApiConfig, AutoConfig, CollectorConfig, LogFormat,
    LoggingConfig, RemoteConfig, ServiceMeta,
};
