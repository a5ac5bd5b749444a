//! Log output for the CLI.
//!
//! The library crates log through the `log` facade. The subscriber installed
//! here picks those records up and writes them to stderr, so stdout stays
//! clean for JSON output.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 1)
        .try_init();

    if let Err(e) = result {
        eprintln!("warning: logging unavailable: {}", e);
    }
}
