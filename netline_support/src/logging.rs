//! Structured logging, grounded in `flux::logging::init`.
//!
//! `flux::logging::init` hard-codes a terminal `sloggers` config; here
//! the default is the same terminal/stderr/debug setup, but callers may
//! build their own `slog::Logger` and hand it in instead (`Channel::new`
//! already accepts an optional `&Logger`, which this follows).

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Builds a default terminal logger at debug severity writing to stderr.
pub fn default_logger() -> slog::Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Debug);
    builder.destination(Destination::Stderr);

    builder.build().unwrap_or_else(|_| slog::Logger::root(slog::Discard, slog::o!()))
}

/// A logger that discards everything; useful when the embedding
/// application has not wired up its own sink yet.
pub fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
