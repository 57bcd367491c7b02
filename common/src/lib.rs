#[doc(hidden)]
pub use tracing as __tracing;

pub mod log;

pub mod config;
pub mod error;
pub mod host;
pub mod report;

pub use config::Config;
pub use error::{AggregationError, CheckError, ConfigError};
pub use host::{Host, HostAttributes, IgnoreList};
