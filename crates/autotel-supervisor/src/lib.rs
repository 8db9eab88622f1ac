pub mod error;
pub mod health;
pub mod process;
pub mod restart;
pub mod supervisor;

pub use error::SupervisorError;
pub use health::{stubs, HealthProbe, HttpHealthProbe};
pub use process::{CollectorProcess, HEALTH_PORT_ENV};
pub use restart::RestartPolicy;
pub use supervisor::{Supervisor, SupervisorConfig};
