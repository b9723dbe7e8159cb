//! Tracing setup for the binary and the test suites.
//!
//! Human-readable events go to stderr so stdout stays clean for reports and
//! `--json` output. `--log-file` adds a JSON copy of every event.

use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::{Mutex, Once};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the `-v`/`-q` derived filter.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be
/// created, or a subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter(verbosity, quiet))?,
    };

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .with_ansi(std::io::stderr().is_terminal());

    let json_file = log_file
        .map(|path| {
            File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))
        })
        .transpose()?
        .map(|file| fmt::layer().json().with_ansi(false).with_writer(Mutex::new(file)));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(json_file)
        .try_init()?;
    Ok(())
}

fn default_filter(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "clickup_sync=info",
        1 => "clickup_sync=debug",
        2 => "clickup_sync=debug,ureq=debug",
        _ => "clickup_sync=trace,ureq=trace,rusqlite=debug",
    }
}

/// Route events to the libtest capture, once per test binary.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("clickup_sync=debug")
            .with_test_writer()
            .try_init();
    });
}
