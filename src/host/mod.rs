//! Process wiring: CLI, startup sequence, and task lifecycle.

pub mod bootstrap;
pub mod cli;
pub mod service_handle;

pub use bootstrap::{load_chains_config, Host};
pub use cli::{run_cli, Cli};
pub use service_handle::ServiceHandle;
