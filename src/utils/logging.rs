use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Output format for host logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console lines.
    #[default]
    Console,
    /// Single-line structured records with timestamp, level and message.
    Json,
}

/// Initialize the tracing subscriber for the whole process.
///
/// `debug` widens the default filter to debug-level host logs; an explicit
/// `RUST_LOG` still wins.
pub fn init_logging(format: LogFormat, debug: bool) {
    let default_directive = if debug { "chainhost=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        LogFormat::Console => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
