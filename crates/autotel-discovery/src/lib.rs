pub mod config_file;
pub mod correlate;
pub mod engine;
pub mod error;
pub mod package;
pub mod patterns;
pub mod port;
pub mod process;
pub mod scanner;

pub use config_file::ConfigFileScanner;
pub use correlate::correlate;
pub use engine::{DiscoveryEngine, DiscoveryReport};
pub use error::DiscoveryError;
pub use package::{PackageInfo, PackageQuery, PackageScanner, SystemPackageQuery};
pub use port::PortScanner;
pub use process::ProcessScanner;
pub use scanner::{Candidate, ScanOutcome, Scanner};
