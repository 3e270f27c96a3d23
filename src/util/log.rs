use std::fmt::Display;

use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Header printed when a session starts
pub const DEV_MARKER: &str = "◈ Netlify Dev ◈";

const MARKER: &str = "◈";

/// Initialize structured logging with tracing.
///
/// Log level can be controlled via RUST_LOG env var.
/// Default level is "warn": session progress is reported through `emit`,
/// tracing carries the internal diagnostics.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();
}

/// Severity of a user-facing session line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    fn marker(self) -> colored::ColoredString {
        match self {
            Severity::Info => MARKER.cyan(),
            Severity::Warn => MARKER.yellow(),
            Severity::Error => MARKER.red(),
        }
    }
}

/// Print one session line prefixed with its severity marker.
pub fn emit(severity: Severity, message: impl Display) {
    match severity {
        Severity::Error => eprintln!("{} {}", severity.marker(), message),
        _ => println!("{} {}", severity.marker(), message),
    }
}
