pub mod baseline;
pub mod client;
pub mod error;

pub use baseline::{build_baseline, AGENT_VERSION};
pub use client::{RemoteClient, RetryPolicy};
pub use error::RemoteError;
