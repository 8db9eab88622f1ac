pub mod command;
pub mod error;
pub mod events;
pub mod orchestrator;

pub use command::{AgentSnapshot, Command, OrchestratorHandle};
pub use error::OrchestratorError;
pub use events::EventBus;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
