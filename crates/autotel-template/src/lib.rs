pub mod error;
pub mod render;
pub mod store;
pub mod vars;

pub use error::RenderError;
pub use render::Renderer;
pub use store::{integration_for, Template, EXPORTER, HOSTMETRICS, INTEGRATIONS, PROCESSORS};
pub use vars::{common_env, endpoint_var, integration_env, VariableEnv};
