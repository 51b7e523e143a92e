//! Command-line interface
//!
//! Clap-based surface for the interactive subcommands. Hook invocations are
//! detected and dispatched before argument parsing (see `hook::is_git_hook`),
//! so clap only ever sees interactive calls.

pub mod commands;
pub mod output;

pub use commands::Cli;

/// Verbosity for hook runs: `PRE_PUSH_VERBOSE` wins over the CLI flag, and an
/// invalid value means quiet.
pub fn verbose_level(flag: u8) -> u8 {
    match std::env::var("PRE_PUSH_VERBOSE") {
        Ok(value) => value.trim().parse().unwrap_or(0),
        Err(_) => flag,
    }
}

/// `PRE_PUSH_DEBUG=1` enables diagnostics regardless of the CLI flag.
pub fn debug_enabled(flag: bool) -> bool {
    flag || std::env::var("PRE_PUSH_DEBUG").is_ok_and(|v| v == "1")
}

/// Maps verbosity to a tracing filter the way the `-v` count is documented.
pub fn setup_logging(verbose: u8, debug: bool) {
    let level = if debug {
        "debug"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
