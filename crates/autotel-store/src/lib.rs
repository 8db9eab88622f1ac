pub mod atomic;
pub mod error;
pub mod layout;
pub mod versions;

pub use atomic::write_atomic;
pub use error::StoreError;
pub use layout::DataLayout;
pub use versions::{FsVersionStore, InMemoryVersionStore, VersionStore, DEFAULT_RETENTION};
