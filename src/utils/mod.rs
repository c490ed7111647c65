//! Utility module: errors and logging.

pub mod errors;
pub mod logging;

pub use errors::HostError;
pub use logging::{init_logging, LogFormat};
